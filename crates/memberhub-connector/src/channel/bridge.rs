//! Bridge page served at the OAuth callback path.
//!
//! It forwards its own URL (query and fragment included) to the message
//! endpoint on the same origin, which is what makes the browser attach a
//! matching `Origin` header.

use memberhub_core::branding;

pub(crate) fn bridge_page() -> String {
    let app_name = branding::DISPLAY_NAME;
    let platform = branding::PLATFORM_NAME;
    let message_path = branding::OAUTH_MESSAGE_PATH;

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{app_name} - {platform} Authorization</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            min-height: 100vh;
            margin: 0;
            display: flex;
            align-items: center;
            justify-content: center;
            background: #15171c;
            color: #e6e6e6;
        }}
        .container {{ text-align: center; max-width: 420px; padding: 1rem; }}
        h1 {{ font-size: 1.4rem; font-weight: 600; margin-bottom: 0.75rem; }}
        p {{ color: #9aa0aa; line-height: 1.5; }}
        input {{ width: 100%; margin-top: 1rem; padding: 0.4rem; font-size: 0.75rem; }}
    </style>
</head>
<body>
    <div class="container">
        <h1 id="title">Finishing {platform} connection...</h1>
        <p id="detail">If {app_name} is still waiting, copy the address below and paste it into {app_name}. Otherwise you can close this window.</p>
        <input id="url" readonly aria-label="Redirect URL">
    </div>
    <script>
        (function () {{
            var href = window.location.href;
            document.getElementById('url').value = href;
            fetch({message_path:?}, {{
                method: 'POST',
                headers: {{ 'Content-Type': 'application/json' }},
                body: JSON.stringify({{ type: 'OAUTH_REDIRECT', url: href }})
            }}).then(function () {{
                document.getElementById('title').textContent = 'Sent to {app_name}';
            }}).catch(function () {{
                document.getElementById('title').textContent = 'Could not reach {app_name}';
                document.getElementById('detail').textContent =
                    'Copy the address below and paste it into {app_name}.';
            }});
        }})();
    </script>
</body>
</html>"##
    )
}
