//! Subcommand handlers

use anyhow::Context;
use memberhub_connector::{ConnectError, Rehydration};
use memberhub_core::{ConnectedUserProfile, PlatformData};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::state::AppState;

/// Restore the stored session and wait for its data refresh.
async fn restore(app: &AppState) -> Rehydration {
    let mut rehydration = app.connector.rehydrator().run().await;
    if let Some(refresh) = rehydration.refresh.take() {
        match refresh.await {
            Ok(Err(e)) => warn!("Could not refresh data: {}", e),
            Err(e) => warn!("Data refresh task failed: {}", e),
            Ok(Ok(_)) => {}
        }
    }
    rehydration
}

pub async fn status(app: &AppState) -> anyhow::Result<()> {
    restore(app).await;
    let controller = app.connector.controller();
    let snapshot = controller.snapshot();

    println!("{}", controller.status().status_text());
    if let Some(user) = &snapshot.user {
        print_profile(user);
    }
    if let Some(at) = app.settings.last_connected_at().await {
        println!("Last connected: {}", at.format("%Y-%m-%d %H:%M UTC"));
    }
    if snapshot.user.is_some() {
        print_data(&snapshot.data);
    }
    Ok(())
}

pub async fn connect(app: &AppState, manual: bool) -> anyhow::Result<()> {
    restore(app).await;
    let controller = app.connector.controller();

    let result = if manual {
        connect_manually(app).await
    } else {
        println!("Opening the authorization window...");
        controller.connect().await
    };

    match result {
        Ok(user) => {
            println!("{}", controller.status().status_text());
            print_profile(&user);
            print_data(&controller.snapshot().data);
            Ok(())
        }
        Err(ConnectError::AlreadyConnected) => {
            println!("{}", controller.status().status_text());
            println!("Run `memberhub disconnect` first to switch accounts.");
            Ok(())
        }
        Err(e) => Err(e).context("Connection failed"),
    }
}

async fn connect_manually(app: &AppState) -> Result<ConnectedUserProfile, ConnectError> {
    let controller = app.connector.controller();
    let auth_url = controller.begin_redirect().await?;

    println!("Open this URL in a browser and authorize access:\n\n  {}\n", auth_url);
    println!("Then paste the address of the page you were sent to:");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let redirect_url = match lines.next_line().await {
        Ok(Some(line)) => line,
        Ok(None) => {
            controller.cancel().await;
            return Err(ConnectError::UserCancelled);
        }
        Err(e) => {
            controller.cancel().await;
            return Err(ConnectError::Internal(format!("failed to read stdin: {}", e)));
        }
    };
    controller.complete_from_redirect(redirect_url.trim()).await
}

pub async fn disconnect(app: &AppState) -> anyhow::Result<()> {
    app.connector
        .controller()
        .disconnect()
        .await
        .context("Disconnect failed")?;
    println!("Disconnected.");
    Ok(())
}

pub async fn refresh(app: &AppState) -> anyhow::Result<()> {
    let rehydration = app.connector.rehydrator().run().await;
    if !rehydration.is_connected() {
        println!("Not connected.");
        return Ok(());
    }
    let data = match rehydration.refresh {
        Some(handle) => handle.await.context("Data refresh task failed")?,
        None => app.connector.controller().refresh_data().await,
    };
    match data {
        Ok(data) => {
            print_data(&data);
            Ok(())
        }
        Err(e) if e.is_unauthorized() => {
            println!("{}", app.connector.controller().status().status_text());
            println!("Run `memberhub connect` to reconnect.");
            Ok(())
        }
        Err(e) => Err(e).context("Refresh failed"),
    }
}

fn print_profile(user: &ConnectedUserProfile) {
    println!(
        "  {} (@{}): {} followers, {} following, {} tracks, {} playlists",
        user.label(),
        user.username,
        user.follower_count,
        user.following_count,
        user.track_count,
        user.playlist_count
    );
}

fn print_data(data: &PlatformData) {
    if data.is_empty() {
        println!("No tracks or playlists loaded.");
        return;
    }
    println!("Tracks ({}):", data.tracks.len());
    for track in &data.tracks {
        let secs = track.duration / 1000;
        println!("  {} [{}:{:02}]", track.title, secs / 60, secs % 60);
    }
    println!("Playlists ({}):", data.playlists.len());
    for playlist in &data.playlists {
        println!("  {} ({} tracks)", playlist.title, playlist.track_count);
    }
}
