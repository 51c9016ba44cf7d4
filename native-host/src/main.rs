//! Native Messaging Host - runs the clipper for the browser extension
//!
//! Receives length-prefixed JSON messages from the extension on stdin,
//! builds notes with `clipper-core`, and answers on stdout. Logs go to
//! stderr because stdout carries the protocol.

use std::io::{self, Read, Write};

use clipper_core::{ClipRequest, Clipper, Config, HostMessage, HostReply, SaveResponse};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Chrome refuses messages from the host above 1 MB
const MAX_REPLY_BYTES: usize = 1024 * 1024;

/// Read a native messaging message from stdin
fn read_message() -> io::Result<Option<Vec<u8>>> {
    let mut length_bytes = [0u8; 4];

    match io::stdin().read_exact(&mut length_bytes) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let length = u32::from_ne_bytes(length_bytes) as usize;
    if length == 0 {
        return Ok(None);
    }

    let mut message = vec![0u8; length];
    io::stdin().read_exact(&mut message)?;

    Ok(Some(message))
}

/// Write a native messaging message to stdout
fn write_message(message: &[u8]) -> io::Result<()> {
    let length = message.len() as u32;
    let length_bytes = length.to_ne_bytes();

    let mut stdout = io::stdout().lock();
    stdout.write_all(&length_bytes)?;
    stdout.write_all(message)?;
    stdout.flush()?;

    Ok(())
}

/// Locale for user-facing error messages
fn locale() -> String {
    std::env::var("LANG").unwrap_or_else(|_| "en".to_string())
}

async fn handle_clip(clipper: &Clipper, request: ClipRequest) -> HostReply {
    let locale = locale();

    if clipper.config().vault.path.is_some() {
        let transports = clipper.configured_transports();
        let response = match clipper.clip_and_save(&request, &transports).await {
            Ok(Some((_, saved))) => SaveResponse::saved(&saved),
            Ok(None) => SaveResponse::nothing_to_save(),
            Err(e) => {
                warn!("Clip failed: {}", e);
                SaveResponse::clip_failed(&e, &locale)
            }
        };
        return HostReply::Saved(response);
    }

    // No vault on this machine: the extension saves through its own transport
    match clipper.clip(&request).await {
        Ok(Some(note)) => HostReply::Note {
            content: note.content,
            filename: note.filename,
            message_count: note.message_count,
        },
        Ok(None) => HostReply::Saved(SaveResponse::nothing_to_save()),
        Err(e) => {
            warn!("Clip failed: {}", e);
            HostReply::Saved(SaveResponse::clip_failed(&e, &locale))
        }
    }
}

async fn handle_message(clipper: &Clipper, message: &[u8]) -> HostReply {
    match serde_json::from_slice::<HostMessage>(message) {
        Ok(HostMessage::Ping) => HostReply::Status { received: true },
        Ok(HostMessage::Clip(request)) => {
            info!("Clip request for {}", request.url);
            handle_clip(clipper, request).await
        }
        Err(e) => {
            warn!("Invalid message: {}", e);
            HostReply::Saved(SaveResponse::error(&format!("Invalid message: {}", e), "invalid_request"))
        }
    }
}

fn encode_reply(reply: &HostReply) -> Vec<u8> {
    let encoded = serde_json::to_vec(reply).unwrap_or_default();
    if encoded.len() <= MAX_REPLY_BYTES {
        return encoded;
    }

    warn!("Reply of {} bytes exceeds the native messaging limit", encoded.len());
    let fallback = HostReply::Saved(SaveResponse::error(
        "The note is too large to return to the browser. Configure a vault path to save it directly.",
        "reply_too_large",
    ));
    serde_json::to_vec(&fallback).unwrap_or_default()
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Logging goes to stderr; stdout is the native messaging channel
    let env_level = std::env::var("RUST_LOG").ok();
    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new(env_level.as_deref().unwrap_or("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = Config::load();
    if env_level.is_none() {
        if let Err(e) = filter_handle.reload(EnvFilter::new(&config.general.log_level)) {
            warn!("Failed to apply configured log level: {}", e);
        }
    }

    info!("Native host started");
    let clipper = Clipper::new(config);

    // Main message loop
    loop {
        match read_message() {
            Ok(Some(message)) => {
                debug!("Received {} bytes from extension", message.len());

                let reply = handle_message(&clipper, &message).await;
                if let Err(e) = write_message(&encode_reply(&reply)) {
                    error!("Failed to write response: {}", e);
                    break;
                }
            }
            Ok(None) => {
                info!("Connection closed");
                break;
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping() {
        let clipper = Clipper::new(Config::default());
        let reply = handle_message(&clipper, br#"{"type":"ping"}"#).await;
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            serde_json::json!({"type": "status", "received": true})
        );
    }

    #[tokio::test]
    async fn test_clip_returns_note_without_vault() {
        let clipper = Clipper::new(Config::default());
        let message = serde_json::json!({
            "type": "clip",
            "payload": {
                "url": "https://chatgpt.com/c/1",
                "html": "<html><body><div data-message-author-role=\"user\"><div class=\"whitespace-pre-wrap\">Hello there</div></div></body></html>"
            }
        });

        let reply = handle_message(&clipper, message.to_string().as_bytes()).await;
        match reply {
            HostReply::Note { content, message_count, .. } => {
                assert_eq!(message_count, 1);
                assert!(content.contains("### User\n\nHello there"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_message() {
        let clipper = Clipper::new(Config::default());
        let reply = handle_message(&clipper, b"not json").await;
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "saved");
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unsupported_page_reports_code() {
        let clipper = Clipper::new(Config::default());
        let message = r#"{"type":"clip","payload":{"url":"https://example.com","html":"<p>x</p>"}}"#;
        let json = serde_json::to_value(handle_message(&clipper, message.as_bytes()).await).unwrap();
        assert_eq!(json["code"], "unsupported_service");
    }
}
