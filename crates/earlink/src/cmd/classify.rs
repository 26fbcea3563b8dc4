use comfy_table::{presets::UTF8_FULL, Table};
use earlink_frame::{DeviceStatus, ProtocolVersion};
use earlink_session::SessionConfig;
use serde::Serialize;

use crate::cmd::ClassifyArgs;
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct ClassifyOutput<'a> {
    text: &'a str,
    version: i32,
    protocol: &'static str,
    header_trim: usize,
}

pub fn run(args: ClassifyArgs, format: OutputFormat, config: &SessionConfig) -> CliResult<i32> {
    let mut status = DeviceStatus::new(config.version_policy);
    if !status.apply(args.text.as_bytes()) {
        return Err(CliError::new(
            DATA_INVALID,
            format!("not a status line: {:?}", args.text),
        ));
    }

    let protocol = status.protocol_version();
    let out = ClassifyOutput {
        text: status.text().unwrap_or_default(),
        version: status.version(),
        protocol: match protocol {
            ProtocolVersion::V3 => "v3",
            ProtocolVersion::V4 => "v4",
        },
        header_trim: protocol.header_trim(),
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["FIELD", "VALUE"])
                .add_row(vec!["text".to_string(), out.text.to_string()])
                .add_row(vec!["version".to_string(), out.version.to_string()])
                .add_row(vec!["protocol".to_string(), out.protocol.to_string()])
                .add_row(vec!["header_trim".to_string(), out.header_trim.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "status={:?} version={} protocol={} header_trim={}",
                out.text, out.version, out.protocol, out.header_trim
            );
        }
        OutputFormat::Csv => {
            println!("version,protocol,header_trim");
            println!("{},{},{}", out.version, out.protocol, out.header_trim);
        }
    }
    Ok(SUCCESS)
}
