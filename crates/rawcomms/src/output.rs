use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rawcomms_frame::Transmission;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct TransmissionOutput {
    peer: String,
    metadata_size: u16,
    payload_size: u64,
    metadata: serde_json::Value,
    payload: String,
    payload_bytes: usize,
    timestamp: String,
}

pub fn print_transmission(t: &Transmission, peer: SocketAddr, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = TransmissionOutput {
                peer: peer.to_string(),
                metadata_size: t.metadata_size,
                payload_size: t.payload_size,
                metadata: metadata_value(t),
                payload: preview(t.payload.as_ref()),
                payload_bytes: t.payload.len(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "METADATA", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    peer.to_string(),
                    preview(t.metadata.as_ref()),
                    t.payload.len().to_string(),
                    preview(t.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "peer={} metadata={} size={} payload={}",
                peer,
                preview(t.metadata.as_ref()),
                t.payload.len(),
                preview(t.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(t.payload.as_ref());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Metadata as JSON when it parses, otherwise as a string preview.
fn metadata_value(t: &Transmission) -> serde_json::Value {
    if t.metadata.is_empty() {
        return serde_json::Value::Null;
    }
    t.metadata_json::<serde_json::Value>()
        .unwrap_or_else(|_| serde_json::Value::String(preview(t.metadata.as_ref())))
}

fn preview(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", bytes.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_metadata_is_embedded_as_an_object() {
        let t = Transmission::new(&b"x"[..], &br#"{"agentname":"a","endpoint":1}"#[..]).unwrap();
        let value = metadata_value(&t);
        assert_eq!(value["agentname"], "a");
        assert_eq!(value["endpoint"], 1);
    }

    #[test]
    fn opaque_metadata_falls_back_to_text() {
        let t = Transmission::new(&b"x"[..], &b"plain words"[..]).unwrap();
        assert_eq!(metadata_value(&t), serde_json::Value::String("plain words".into()));

        let empty = Transmission::new(&b"x"[..], &b""[..]).unwrap();
        assert!(metadata_value(&empty).is_null());
    }

    #[test]
    fn binary_payload_preview() {
        assert_eq!(preview(&[0xff, 0xfe, 0x00]), "<binary 3 bytes>");
        assert_eq!(preview(b"text"), "text");
    }
}
