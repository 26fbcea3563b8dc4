use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use earlink_frame::{ChannelLayout, Sample};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Csv,
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

/// A decoded sample with slots resolved to field names.
#[derive(Debug, Serialize, PartialEq)]
pub struct SampleView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<&'static str>,
    pub package_num: f64,
    pub eeg: Vec<f64>,
    pub rotation: [f64; 3],
    pub battery: f64,
    pub gesture: f64,
    pub detection: [f64; 2],
    pub device_status: f64,
    pub device_timestamp: f64,
    pub timestamp: f64,
}

impl SampleView {
    pub fn new(sample: &Sample, layout: &ChannelLayout, side: Option<&'static str>) -> Self {
        let [det1, det2] = layout.detection_channels();
        Self {
            side,
            package_num: sample.get(layout.package_num_channel),
            eeg: layout.eeg_channels.iter().map(|i| sample.get(*i)).collect(),
            rotation: layout.rotation_channels.map(|i| sample.get(i)),
            battery: sample.get(layout.battery_channel),
            gesture: sample.get(layout.gesture_channel()),
            detection: [sample.get(det1), sample.get(det2)],
            device_status: sample.get(layout.device_status_channel()),
            device_timestamp: sample.get(layout.device_timestamp_channel()),
            timestamp: sample.get(layout.timestamp_channel),
        }
    }
}

/// Prints samples as they arrive. Table output is buffered until [`finish`](Self::finish).
pub struct SamplePrinter<'a> {
    layout: &'a ChannelLayout,
    format: OutputFormat,
    table: Option<Table>,
    csv_header_written: bool,
}

impl<'a> SamplePrinter<'a> {
    pub fn new(layout: &'a ChannelLayout, format: OutputFormat) -> Self {
        Self {
            layout,
            format,
            table: None,
            csv_header_written: false,
        }
    }

    pub fn print(&mut self, sample: &Sample, side: Option<&'static str>) {
        match self.format {
            OutputFormat::Json => {
                let view = SampleView::new(sample, self.layout, side);
                println!(
                    "{}",
                    serde_json::to_string(&view).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Table => {
                let view = SampleView::new(sample, self.layout, side);
                let table = self.table.get_or_insert_with(new_table);
                table.add_row(vec![
                    side.unwrap_or("-").to_string(),
                    format!("{}", view.package_num),
                    join(&view.eeg, 3),
                    join(&view.rotation, 2),
                    format!("{}", view.battery),
                    join(&view.detection, 0),
                    format!("{}", view.device_timestamp),
                ]);
            }
            OutputFormat::Pretty => {
                let view = SampleView::new(sample, self.layout, side);
                println!(
                    "{}pkg={} eeg=[{}] rot=[{}] bat={} gesture={} det=[{}] status={} dev_ts={} ts={:.3}",
                    side.map(|s| format!("[{s}] ")).unwrap_or_default(),
                    view.package_num,
                    join(&view.eeg, 3),
                    join(&view.rotation, 2),
                    view.battery,
                    view.gesture,
                    join(&view.detection, 0),
                    view.device_status,
                    view.device_timestamp,
                    view.timestamp
                );
            }
            OutputFormat::Csv => {
                let mut out = std::io::stdout().lock();
                if !self.csv_header_written {
                    let mut header = slot_names(self.layout);
                    if side.is_some() {
                        header.insert(0, "side".to_string());
                    }
                    let _ = writeln!(out, "{}", header.join(","));
                    self.csv_header_written = true;
                }
                let values = sample
                    .values()
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let _ = match side {
                    Some(side) => writeln!(out, "{side},{values}"),
                    None => writeln!(out, "{values}"),
                };
            }
        }
    }

    pub fn finish(self) {
        if let Some(table) = self.table {
            println!("{table}");
        }
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "SIDE", "PKG", "EEG (uV)", "ROTATION", "BAT", "DETECTION", "DEVICE TS",
        ]);
    table
}

/// Column names for every slot of a sample row.
pub fn slot_names(layout: &ChannelLayout) -> Vec<String> {
    let mut names: Vec<String> = (0..layout.num_rows).map(|i| format!("slot{i}")).collect();
    let mut name = |index: usize, label: String| {
        if let Some(slot) = names.get_mut(index) {
            *slot = label;
        }
    };

    name(layout.package_num_channel, "package_num".to_string());
    for (i, index) in layout.eeg_channels.iter().enumerate() {
        name(*index, format!("eeg{i}"));
    }
    for (index, axis) in layout.rotation_channels.iter().zip(["roll", "pitch", "yaw"]) {
        name(*index, axis.to_string());
    }
    name(layout.battery_channel, "battery".to_string());
    name(layout.gesture_channel(), "gesture".to_string());
    let [det1, det2] = layout.detection_channels();
    name(det1, "detection1".to_string());
    name(det2, "detection2".to_string());
    name(layout.device_status_channel(), "device_status".to_string());
    name(layout.device_timestamp_channel(), "device_timestamp".to_string());
    name(layout.timestamp_channel, "timestamp".to_string());
    names
}

fn join(values: &[f64], precision: usize) -> String {
    values
        .iter()
        .map(|v| format!("{v:.precision$}"))
        .collect::<Vec<_>>()
        .join(" ")
}
