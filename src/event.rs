//! # Traffic Log Parsing
//!
//! Reads the per-packet event log the simulator writes at the end of a run
//! (`TrafficInformation.csv`) into typed [`PacketEvent`] records.
//!
//! The simulator emits a header such as
//!
//! ```text
//! PacketID,Source,Destination,PacketSize,Status,SentTime,ReceivedTime,
//! ```
//!
//! followed by one row per generated packet, each with a trailing comma.
//! Header tokens are matched case- and punctuation-insensitively, so
//! `SentTime`, `sent_time` and `SENT-TIME` all name the same column.
//!
//! Only a missing required column is fatal. Bad values inside a row never
//! abort the parse: unparsable timestamps become `None`, and a row whose
//! node ids cannot be read is dropped on its own.

use crate::error::AnalysisError;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Node identifier as written by the simulator
pub type NodeId = i64;

/// Delivery status of a packet at the end of the simulation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PacketStatus {
    /// Injected into the network but not delivered (`S`)
    Sent,
    /// Delivered to its destination terminal (`R`)
    Received,
    /// Any other code, e.g. `V` for packets generated but never injected
    Other(String),
}

impl PacketStatus {
    /// Normalize a raw status code from the log
    pub fn from_code(code: &str) -> Self {
        let code = code.trim();
        if code.eq_ignore_ascii_case("S") {
            Self::Sent
        } else if code.eq_ignore_ascii_case("R") {
            Self::Received
        } else {
            Self::Other(code.to_string())
        }
    }

    pub fn is_received(&self) -> bool {
        matches!(self, Self::Received)
    }
}

impl std::fmt::Display for PacketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketStatus::Sent => write!(f, "S"),
            PacketStatus::Received => write!(f, "R"),
            PacketStatus::Other(code) => write!(f, "{}", code),
        }
    }
}

/// One row of the traffic log
#[derive(Debug, Clone, PartialEq)]
pub struct PacketEvent {
    pub packet_id: Option<u64>,
    pub source: NodeId,
    pub destination: NodeId,
    pub packet_size: Option<u32>,
    pub status: PacketStatus,
    pub sent_time: Option<f64>,
    pub received_time: Option<f64>,
}

impl PacketEvent {
    /// Create an event with the required fields only
    pub fn new(
        source: NodeId,
        destination: NodeId,
        sent_time: Option<f64>,
        received_time: Option<f64>,
        status: PacketStatus,
    ) -> Self {
        Self {
            packet_id: None,
            source,
            destination,
            packet_size: None,
            status,
            sent_time,
            received_time,
        }
    }

    /// Cycles between injection and delivery.
    ///
    /// Defined only for received packets with both timestamps present and a
    /// receive time not earlier than the send time.
    pub fn latency(&self) -> Option<f64> {
        if !self.status.is_received() {
            return None;
        }
        match (self.sent_time, self.received_time) {
            (Some(sent), Some(received)) if received >= sent => Some(received - sent),
            _ => None,
        }
    }

    /// A received packet whose latency cannot be derived
    pub fn is_malformed(&self) -> bool {
        self.status.is_received() && self.latency().is_none()
    }
}

/// Canonical log columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    PacketId,
    Source,
    Destination,
    PacketSize,
    Status,
    SentTime,
    ReceivedTime,
}

impl Column {
    const REQUIRED: [Column; 5] = [
        Column::Source,
        Column::Destination,
        Column::SentTime,
        Column::ReceivedTime,
        Column::Status,
    ];

    fn from_header(token: &str) -> Option<Self> {
        match normalize_header(token).as_str() {
            "packetid" | "id" => Some(Self::PacketId),
            "source" | "src" => Some(Self::Source),
            "destination" | "dest" | "dst" => Some(Self::Destination),
            "packetsize" | "size" => Some(Self::PacketSize),
            "status" => Some(Self::Status),
            "senttime" => Some(Self::SentTime),
            "receivedtime" => Some(Self::ReceivedTime),
            _ => None,
        }
    }

    fn canonical_name(self) -> &'static str {
        match self {
            Self::PacketId => "packetid",
            Self::Source => "source",
            Self::Destination => "destination",
            Self::PacketSize => "packetsize",
            Self::Status => "status",
            Self::SentTime => "senttime",
            Self::ReceivedTime => "receivedtime",
        }
    }
}

/// Lowercase a header token and drop everything but letters and digits
fn normalize_header(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Column positions resolved from the header row
#[derive(Debug, Default)]
struct ColumnMap {
    packet_id: Option<usize>,
    source: Option<usize>,
    destination: Option<usize>,
    packet_size: Option<usize>,
    status: Option<usize>,
    sent_time: Option<usize>,
    received_time: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut map = Self::default();
        for (index, token) in headers.iter().enumerate() {
            let slot = match Column::from_header(token) {
                Some(column) => map.slot_mut(column),
                None => continue,
            };
            // Duplicate headers keep the first occurrence
            if slot.is_none() {
                *slot = Some(index);
            }
        }
        map
    }

    fn slot_mut(&mut self, column: Column) -> &mut Option<usize> {
        match column {
            Column::PacketId => &mut self.packet_id,
            Column::Source => &mut self.source,
            Column::Destination => &mut self.destination,
            Column::PacketSize => &mut self.packet_size,
            Column::Status => &mut self.status,
            Column::SentTime => &mut self.sent_time,
            Column::ReceivedTime => &mut self.received_time,
        }
    }

    fn missing(&mut self) -> Vec<String> {
        Column::REQUIRED
            .iter()
            .filter(|&&column| self.slot_mut(column).is_none())
            .map(|column| column.canonical_name().to_string())
            .collect()
    }
}

fn field<'r>(record: &'r csv::StringRecord, index: Option<usize>) -> Option<&'r str> {
    index.and_then(|i| record.get(i)).map(str::trim)
}

fn parse_time(raw: Option<&str>) -> Option<f64> {
    raw?.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_node(raw: Option<&str>) -> Option<NodeId> {
    raw?.parse::<NodeId>().ok()
}

/// Parse a traffic log from any reader.
///
/// `origin` is only used to label errors and log messages.
pub fn parse_log<R: Read>(reader: R, origin: &Path) -> Result<Vec<PacketEvent>, AnalysisError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers().map_err(|source| AnalysisError::Csv {
        path: origin.to_path_buf(),
        source,
    })?;
    let mut columns = ColumnMap::from_headers(headers);

    let missing = columns.missing();
    if !missing.is_empty() {
        return Err(AnalysisError::MalformedLog {
            path: origin.to_path_buf(),
            missing,
        });
    }

    let mut events = Vec::new();
    let mut skipped = 0usize;

    for (row, result) in csv_reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(source) if source.is_io_error() => {
                return Err(AnalysisError::Csv {
                    path: origin.to_path_buf(),
                    source,
                });
            }
            Err(e) => {
                debug!("Skipping unreadable row {} in {:?}: {}", row + 2, origin, e);
                skipped += 1;
                continue;
            }
        };

        let (source, destination) = match (
            parse_node(field(&record, columns.source)),
            parse_node(field(&record, columns.destination)),
        ) {
            (Some(source), Some(destination)) => (source, destination),
            _ => {
                debug!("Skipping row {} in {:?}: unreadable node id", row + 2, origin);
                skipped += 1;
                continue;
            }
        };

        events.push(PacketEvent {
            packet_id: field(&record, columns.packet_id).and_then(|v| v.parse().ok()),
            source,
            destination,
            packet_size: field(&record, columns.packet_size).and_then(|v| v.parse().ok()),
            status: PacketStatus::from_code(field(&record, columns.status).unwrap_or_default()),
            sent_time: parse_time(field(&record, columns.sent_time)),
            received_time: parse_time(field(&record, columns.received_time)),
        });
    }

    if skipped > 0 {
        warn!("Skipped {} unreadable row(s) in {:?}", skipped, origin);
    }
    debug!("Parsed {} packet events from {:?}", events.len(), origin);

    Ok(events)
}

/// Resolve a user-supplied path to the traffic log it designates.
///
/// A directory resolves to the fixed log file name inside it.
pub fn resolve_log_path(input: &Path) -> Result<PathBuf, AnalysisError> {
    let path = if input.is_dir() {
        input.join(crate::defaults::TRAFFIC_LOG_FILE)
    } else {
        input.to_path_buf()
    };

    if !path.exists() {
        return Err(AnalysisError::FileNotFound { path });
    }
    Ok(path)
}

/// Open and parse a traffic log file
pub fn load_log(path: &Path) -> Result<Vec<PacketEvent>, AnalysisError> {
    let file = File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            AnalysisError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            AnalysisError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    parse_log(file, path)
}
