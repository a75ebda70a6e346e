use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};

use rawcomms_frame::metadata::to_metadata;
use rawcomms_frame::{decode_with_timeout, encode_with_timeout, Header};
use rawcomms_transport::TcpTransport;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_transmission, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;
    let metadata = to_metadata(&header_from(&args)).map_err(|err| frame_error("metadata encode failed", err))?;

    let addr = resolve_addr(&args.addr)?;
    let mut stream =
        TcpTransport::connect_timeout(addr, timeout).map_err(|err| transport_error("connect failed", err))?;

    let written = encode_with_timeout(timeout, &mut stream, &payload, &metadata)
        .map_err(|err| frame_error("send failed", err))?;
    tracing::info!(%addr, bytes = written, "transmission sent");

    if args.wait {
        let reply =
            decode_with_timeout(timeout, &mut stream).map_err(|err| frame_error("receive failed", err))?;
        print_transmission(&reply, addr, format);
    }

    Ok(SUCCESS)
}

fn header_from(args: &SendArgs) -> Header {
    Header {
        agent_name: args.agent.clone(),
        endpoint: args.endpoint,
        additional_data: args.addl.clone(),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

fn resolve_addr(addr: &str) -> CliResult<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|err| CliError::usage(format!("invalid address {addr}: {err}")))?
        .next()
        .ok_or_else(|| CliError::usage(format!("address {addr} did not resolve")))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::exit::USAGE;

    fn args() -> SendArgs {
        SendArgs {
            addr: "127.0.0.1:7400".to_string(),
            data: None,
            file: None,
            agent: "probe".to_string(),
            endpoint: -2,
            addl: "k=v".to_string(),
            timeout: "5s".to_string(),
            wait: false,
        }
    }

    #[test]
    fn header_carries_flag_values() {
        let header = header_from(&args());
        assert_eq!(header.agent_name, "probe");
        assert_eq!(header.endpoint, -2);
        assert_eq!(header.additional_data, "k=v");
    }

    #[test]
    fn payload_defaults_to_empty() {
        assert!(resolve_payload(&args()).unwrap().is_empty());

        let with_data = SendArgs {
            data: Some("hello".to_string()),
            ..args()
        };
        assert_eq!(resolve_payload(&with_data).unwrap(), b"hello");
    }

    #[test]
    fn missing_payload_file_is_reported() {
        let with_file = SendArgs {
            file: Some(PathBuf::from("/nonexistent/rawcomms-payload.bin")),
            ..args()
        };
        let err = resolve_payload(&with_file).unwrap_err();
        assert_eq!(err.code, USAGE);
        assert!(err.message.contains("rawcomms-payload.bin"));
    }

    #[test]
    fn bad_address_is_a_usage_error() {
        assert_eq!(resolve_addr("not-an-address").unwrap_err().code, USAGE);
        assert_eq!(
            resolve_addr("127.0.0.1:7400").unwrap(),
            "127.0.0.1:7400".parse::<SocketAddr>().unwrap()
        );
    }
}
