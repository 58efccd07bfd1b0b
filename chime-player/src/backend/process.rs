//! Helpers for backends that stream PCM into a helper process

use super::{Voice, VoiceStop};
use chime_common::{Error, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Run `program args` to completion, mapping a missing binary to `NoDriver`
pub(crate) async fn probe(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NoDriver(format!("{} not installed", program)),
            _ => Error::System(format!("Failed to run {}: {}", program, e)),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::System(format!("{} {} exited with {}", program, args.join(" "), status)))
    }
}

/// Spawn `program` and feed `pcm` to its stdin
///
/// The voice finishes when the process exits. Stopping it kills the process.
pub(crate) fn spawn_pcm_player(program: &str, args: Vec<String>, pcm: Vec<u8>) -> Result<Voice> {
    debug!("Spawning {} {}", program, args.join(" "));

    let child = Command::new(program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::System(format!("Failed to spawn {}: {}", program, e)))?;

    let (tx, rx) = oneshot::channel();
    let token = CancellationToken::new();
    let stop_token = token.clone();
    let program = program.to_string();

    tokio::spawn(async move {
        let result = supervise(child, pcm, token, &program).await;
        let _ = tx.send(result);
    });

    Ok(Voice::new(VoiceStop::new(move || stop_token.cancel()), rx))
}

async fn supervise(mut child: Child, pcm: Vec<u8>, token: CancellationToken, program: &str) -> Result<()> {
    let stdin = child.stdin.take();

    let outcome = tokio::select! {
        status = feed_and_wait(&mut child, stdin, pcm) => Some(status),
        _ = token.cancelled() => None,
    };

    match outcome {
        None => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", program, e);
            }
            Err(Error::Canceled)
        }
        Some(Ok(status)) if status.success() => Ok(()),
        Some(Ok(status)) => Err(Error::System(format!("{} exited with {}", program, status))),
        Some(Err(e)) => Err(Error::System(format!("{} failed: {}", program, e))),
    }
}

async fn feed_and_wait(
    child: &mut Child,
    stdin: Option<tokio::process::ChildStdin>,
    pcm: Vec<u8>,
) -> std::io::Result<std::process::ExitStatus> {
    if let Some(mut stdin) = stdin {
        stdin.write_all(&pcm).await?;
        stdin.shutdown().await?;
    }
    child.wait().await
}
