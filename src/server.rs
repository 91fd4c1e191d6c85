//! TCP transport for the wire protocol, plus a reference worker client.
//!
//! Frames travel as newline-delimited JSON over a persistent full-duplex
//! connection. The first frame from a client must be `Register` and is
//! answered with `Registered{accepted}`. After the handshake, inbound
//! heartbeat/progress/response frames route into the control plane while a
//! writer task drains the connection's outbound channel. A malformed or
//! out-of-order frame closes the connection without further reads.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::backend::TaskBackend;
use crate::control::ControlPlane;
use crate::error::{Error, Result};
use crate::protocol::{decode_frame, encode_frame, Frame};

/// Bind the control-plane listener.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    Ok(listener)
}

/// Accept loop: serve agent connections until the task is aborted.
pub async fn run_server(listener: TcpListener, control: Arc<ControlPlane>) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Control plane listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!(%peer, "Connection accepted");
        let control = control.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, control).await {
                tracing::warn!(%peer, "Connection closed: {}", e);
            }
        });
    }
}

/// One agent connection, handshake to teardown.
async fn handle_connection(stream: TcpStream, control: Arc<ControlPlane>) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // Handshake: the first frame must be Register.
    let Some(first) = lines.next_line().await? else {
        return Ok(());
    };
    let Frame::Register {
        agent_id,
        token,
        capabilities,
        workdir,
    } = decode_frame(&first)?
    else {
        return Err(Error::Protocol(
            "first frame on a connection must be register".to_string(),
        ));
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let generation = match control.register(&agent_id, tx, &token, capabilities, workdir) {
        Ok(generation) => {
            let frame = Frame::Registered {
                agent_id: agent_id.clone(),
                accepted: true,
                reason: None,
            };
            write_frame(&mut write_half, &frame).await?;
            generation
        }
        Err(e) => {
            let frame = Frame::Registered {
                agent_id: agent_id.clone(),
                accepted: false,
                reason: Some(e.to_string()),
            };
            write_frame(&mut write_half, &frame).await?;
            return Err(e);
        }
    };

    // Writer task: drain the registry-held outbound channel to the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_frame(&mut write_half, &frame).await.is_err() {
                break;
            }
        }
    });

    let result = read_loop(&mut lines, &agent_id, &control).await;

    // Generation-scoped teardown: if a newer registration already replaced
    // this connection, leave it alone.
    control.unregister_generation(&agent_id, generation);
    writer.abort();
    result
}

async fn read_loop(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    agent_id: &str,
    control: &ControlPlane,
) -> Result<()> {
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match decode_frame(&line)? {
            Frame::Heartbeat { agent_id: hb_id, .. } => {
                if hb_id != agent_id {
                    return Err(Error::Protocol(format!(
                        "heartbeat for {} on {}'s connection",
                        hb_id, agent_id
                    )));
                }
                control.registry().record_heartbeat(agent_id);
            }
            Frame::Progress {
                message_id,
                status,
                detail,
            } => {
                control.dispatch().on_progress(&message_id, &status, detail);
            }
            Frame::Response {
                message_id,
                content,
                usage,
                error,
            } => {
                control.dispatch().on_response(&message_id, content, usage, error);
            }
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected {} frame from agent",
                    other.kind()
                )));
            }
        }
    }
    tracing::debug!(agent_id, "Agent closed the connection");
    Ok(())
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &Frame) -> Result<()> {
    let mut line = encode_frame(frame)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Reference worker client: connect, register, heartbeat, and answer
/// dispatches with the given backend until the connection closes.
pub async fn run_worker(
    addr: &str,
    agent_id: &str,
    token: &str,
    role: &str,
    model: &str,
    backend: Arc<dyn TaskBackend>,
    heartbeat_interval: Duration,
) -> Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if write_frame(&mut write_half, &frame).await.is_err() {
                break;
            }
        }
    });

    let register = Frame::Register {
        agent_id: agent_id.to_string(),
        token: token.to_string(),
        capabilities: vec![role.to_string()],
        workdir: None,
    };
    out_tx
        .send(register)
        .map_err(|_| Error::Other("worker writer gone".to_string()))?;

    let Some(answer) = lines.next_line().await? else {
        writer.abort();
        return Err(Error::Protocol("connection closed during handshake".to_string()));
    };
    match decode_frame(&answer)? {
        Frame::Registered { accepted: true, .. } => {
            tracing::info!(agent_id, "Worker registered");
        }
        Frame::Registered {
            accepted: false,
            reason,
            ..
        } => {
            writer.abort();
            return Err(Error::Unauthorized {
                agent_id: agent_id.to_string(),
                reason: reason.unwrap_or_else(|| "rejected".to_string()),
            });
        }
        other => {
            writer.abort();
            return Err(Error::Protocol(format!(
                "expected registered frame, got {}",
                other.kind()
            )));
        }
    }

    let hb_tx = out_tx.clone();
    let hb_agent = agent_id.to_string();
    let heartbeats = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_interval);
        loop {
            ticker.tick().await;
            let frame = Frame::Heartbeat {
                agent_id: hb_agent.clone(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            };
            if hb_tx.send(frame).is_err() {
                break;
            }
        }
    });

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match decode_frame(&line)? {
            Frame::Dispatch {
                message_id,
                content,
                context,
            } => {
                let _ = out_tx.send(Frame::Progress {
                    message_id: message_id.clone(),
                    status: "started".to_string(),
                    detail: None,
                });
                let response = match backend.execute(role, model, &content, context.as_ref()).await
                {
                    Ok(result) => Frame::Response {
                        message_id,
                        content: Some(result.content),
                        usage: result.usage,
                        error: None,
                    },
                    Err(e) => Frame::Response {
                        message_id,
                        content: None,
                        usage: None,
                        error: Some(e.to_string()),
                    },
                };
                if out_tx.send(response).is_err() {
                    break;
                }
            }
            other => {
                tracing::warn!(agent_id, kind = other.kind(), "Unexpected frame at worker, ignored");
            }
        }
    }

    heartbeats.abort();
    writer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EchoBackend, StaticTokenValidator};
    use crate::config::Settings;
    use crate::events::EventBus;

    async fn start_plane(settings: Settings) -> (Arc<ControlPlane>, String) {
        let events = EventBus::default();
        let validator = Arc::new(StaticTokenValidator::from_auth(&settings.auth));
        let control = Arc::new(ControlPlane::new(&settings, events, validator));

        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server_control = control.clone();
        tokio::spawn(async move {
            let _ = run_server(listener, server_control).await;
        });
        (control, addr)
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
        for _ in 0..100 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn worker_round_trip_over_tcp() {
        let (control, addr) = start_plane(Settings::default()).await;

        let worker_addr = addr.clone();
        tokio::spawn(async move {
            let _ = run_worker(
                &worker_addr,
                "agent-1",
                "t",
                "coder",
                "stub-model",
                Arc::new(EchoBackend),
                Duration::from_millis(50),
            )
            .await;
        });

        assert!(wait_until(|| control.registry().is_connected("agent-1")).await);

        let handle = control
            .dispatch()
            .dispatch("agent-1", "fix the bug", None, Some(Duration::from_secs(5)))
            .unwrap();
        let reply = handle.wait().await.unwrap();
        assert_eq!(reply.content, "[coder] fix the bug");
        assert_eq!(control.dispatch().stats_for("agent-1").completed, 1);
    }

    #[tokio::test]
    async fn first_frame_must_be_register() {
        let (control, addr) = start_plane(Settings::default()).await;

        let stream = TcpStream::connect(&addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let frame = Frame::Heartbeat {
            agent_id: "agent-1".to_string(),
            timestamp: 0,
        };
        write_frame(&mut write_half, &frame).await.unwrap();

        // The server closes the connection without answering.
        let mut lines = BufReader::new(read_half).lines();
        assert!(lines.next_line().await.unwrap().is_none());
        assert!(!control.registry().is_connected("agent-1"));
    }

    #[tokio::test]
    async fn bad_token_is_rejected_at_handshake() {
        let mut settings = Settings::default();
        settings.auth.shared_token = Some("secret".to_string());
        let (control, addr) = start_plane(settings).await;

        let err = run_worker(
            &addr,
            "agent-1",
            "wrong",
            "coder",
            "stub-model",
            Arc::new(EchoBackend),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
        assert!(!control.registry().is_connected("agent-1"));
    }

    #[tokio::test]
    async fn duplicate_live_registration_is_rejected() {
        let (control, addr) = start_plane(Settings::default()).await;

        let first_addr = addr.clone();
        tokio::spawn(async move {
            let _ = run_worker(
                &first_addr,
                "agent-1",
                "t",
                "coder",
                "stub-model",
                Arc::new(EchoBackend),
                Duration::from_millis(50),
            )
            .await;
        });
        assert!(wait_until(|| control.registry().is_connected("agent-1")).await);

        let err = run_worker(
            &addr,
            "agent-1",
            "t",
            "coder",
            "stub-model",
            Arc::new(EchoBackend),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
        // The original connection is untouched.
        assert!(control.registry().is_connected("agent-1"));
    }

    #[tokio::test]
    async fn worker_disconnect_unregisters_and_fails_dispatches() {
        let (control, addr) = start_plane(Settings::default()).await;

        let worker = {
            let addr = addr.clone();
            tokio::spawn(async move {
                let _ = run_worker(
                    &addr,
                    "agent-1",
                    "t",
                    "coder",
                    "stub-model",
                    Arc::new(EchoBackend),
                    Duration::from_millis(50),
                )
                .await;
            })
        };
        assert!(wait_until(|| control.registry().is_connected("agent-1")).await);

        worker.abort();
        assert!(wait_until(|| !control.registry().is_connected("agent-1")).await);
        assert!(control
            .dispatch()
            .dispatch("agent-1", "task", None, None)
            .is_err());
    }
}
