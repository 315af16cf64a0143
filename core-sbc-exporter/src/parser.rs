//! Parsing of SBC status command output into metric samples.
//!
//! The status output of the SBC is not a stable format, so parsing is
//! tolerant: every recognized line or variable produces samples, anything
//! else is skipped. Recognized fields are listed in explicit tables
//! ([`STATUS_RULES`], [`MEDIA_STATS_FIELDS`]) so new fields can be added
//! without touching existing ones.
//!
//! Values that cannot be read as numbers are dropped, never reported as
//! zero.

use std::fmt;

use core_sbc_common::{MetricKind, MetricSample};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Status commands understood by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `status`: uptime, session counters, cpu, stack.
    Status,
    /// `show calls count`.
    CallsCount,
    /// `show channels count`.
    ChannelsCount,
    /// `show registrations count`.
    RegistrationsCount,
    /// `sofia status`: SIP profiles and gateways.
    SofiaStatus,
    /// `show channels as json`: active call legs.
    Channels,
    /// `uuid_dump <uuid> json`: per-leg media statistics.
    MediaStats,
}

impl CommandKind {
    /// Queries run on every scrape.
    pub const BASELINE: &'static [CommandKind] = &[
        CommandKind::Status,
        CommandKind::CallsCount,
        CommandKind::ChannelsCount,
        CommandKind::RegistrationsCount,
        CommandKind::SofiaStatus,
    ];

    /// The `api` command issued for this kind. `MediaStats` takes the leg
    /// UUID and `json` as arguments.
    pub fn command(&self) -> &'static str {
        match self {
            CommandKind::Status => "status",
            CommandKind::CallsCount => "show calls count",
            CommandKind::ChannelsCount => "show channels count",
            CommandKind::RegistrationsCount => "show registrations count",
            CommandKind::SofiaStatus => "sofia status",
            CommandKind::Channels => "show channels as json",
            CommandKind::MediaStats => "uuid_dump",
        }
    }

    /// Short name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Status => "status",
            CommandKind::CallsCount => "calls_count",
            CommandKind::ChannelsCount => "channels_count",
            CommandKind::RegistrationsCount => "registrations_count",
            CommandKind::SofiaStatus => "sofia_status",
            CommandKind::Channels => "channels",
            CommandKind::MediaStats => "media_stats",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A body that cannot yield the data its command must provide.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty {0} response")]
    Empty(CommandKind),

    #[error("{kind} response has no {missing}")]
    Missing {
        kind: CommandKind,
        missing: &'static str,
    },

    #[error("invalid JSON in {kind} response: {message}")]
    Json { kind: CommandKind, message: String },
}

/// Description of one exported metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
}

impl FieldSpec {
    pub const fn gauge(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Gauge,
        }
    }

    pub const fn counter(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            kind: MetricKind::Counter,
        }
    }

    fn sample(&self, value: f64) -> MetricSample {
        MetricSample::new(self.name, self.help, self.kind, value)
    }
}

/// How a captured string becomes a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Plain integer or decimal.
    Number,
    /// Size with optional `K`/`M`/`G` suffix, reported in bytes.
    Bytes,
}

impl Conversion {
    fn apply(&self, raw: &str) -> Option<f64> {
        match self {
            Conversion::Number => parse_number(raw),
            Conversion::Bytes => parse_size(raw),
        }
    }
}

/// A recognized `status` line: each capture group maps to one field.
pub struct LineRule {
    pub pattern: Regex,
    pub fields: &'static [(FieldSpec, Conversion)],
}

impl LineRule {
    fn new(pattern: &str, fields: &'static [(FieldSpec, Conversion)]) -> Self {
        Self {
            pattern: Regex::new(pattern).unwrap(),
            fields,
        }
    }
}

const UPTIME: FieldSpec = FieldSpec::gauge("uptime_seconds", "Uptime of the SBC process.");
const READY: FieldSpec = FieldSpec::gauge("ready", "Whether the SBC reports itself ready.");
const VERSION_INFO: FieldSpec = FieldSpec::gauge("version_info", "SBC version, as a label.");

const SESSIONS_FIELDS: &[(FieldSpec, Conversion)] = &[(
    FieldSpec::counter("sessions", "Sessions created since startup."),
    Conversion::Number,
)];

const CURRENT_SESSIONS_FIELDS: &[(FieldSpec, Conversion)] = &[
    (
        FieldSpec::gauge("current_sessions", "Sessions currently active."),
        Conversion::Number,
    ),
    (
        FieldSpec::gauge("sessions_peak", "Peak concurrent sessions since startup."),
        Conversion::Number,
    ),
    (
        FieldSpec::gauge(
            "sessions_peak_5min",
            "Peak concurrent sessions over the last 5 minutes.",
        ),
        Conversion::Number,
    ),
];

const SPS_FIELDS: &[(FieldSpec, Conversion)] = &[
    (
        FieldSpec::gauge("current_sps", "Sessions created per second."),
        Conversion::Number,
    ),
    (
        FieldSpec::gauge("max_sps", "Configured limit of sessions per second."),
        Conversion::Number,
    ),
    (
        FieldSpec::gauge("sps_peak", "Peak sessions per second since startup."),
        Conversion::Number,
    ),
    (
        FieldSpec::gauge(
            "sps_peak_5min",
            "Peak sessions per second over the last 5 minutes.",
        ),
        Conversion::Number,
    ),
];

const MAX_SESSIONS_FIELDS: &[(FieldSpec, Conversion)] = &[(
    FieldSpec::gauge("max_sessions", "Configured limit of concurrent sessions."),
    Conversion::Number,
)];

const IDLE_CPU_FIELDS: &[(FieldSpec, Conversion)] = &[
    (
        FieldSpec::gauge("min_idle_cpu", "Configured minimum idle CPU percentage."),
        Conversion::Number,
    ),
    (
        FieldSpec::gauge("idle_cpu", "Current idle CPU percentage."),
        Conversion::Number,
    ),
];

const STACK_FIELDS: &[(FieldSpec, Conversion)] = &[
    (
        FieldSpec::gauge("stack_size_bytes", "Current thread stack size."),
        Conversion::Bytes,
    ),
    (
        FieldSpec::gauge("stack_size_max_bytes", "Maximum thread stack size."),
        Conversion::Bytes,
    ),
];

/// Numeric `status` lines.
pub static STATUS_RULES: Lazy<Vec<LineRule>> = Lazy::new(|| {
    vec![
        LineRule::new(r"^(\d+) session\(s\) since startup", SESSIONS_FIELDS),
        LineRule::new(
            r"^(\d+) session\(s\) - peak (\d+), last 5min (\d+)",
            CURRENT_SESSIONS_FIELDS,
        ),
        LineRule::new(
            r"^(\d+) session\(s\) per Sec out of max (\d+), peak (\d+), last 5min (\d+)",
            SPS_FIELDS,
        ),
        LineRule::new(r"^(\d+) session\(s\) max", MAX_SESSIONS_FIELDS),
        LineRule::new(r"^min idle cpu ([\d.]+)/([\d.]+)", IDLE_CPU_FIELDS),
        LineRule::new(r"^Current Stack Size/Max (\w+)/(\w+)", STACK_FIELDS),
    ]
});

static UPTIME_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s+(year|day|hour|minute|second|millisecond|microsecond)s?\b")
        .unwrap()
});

static VERSION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(Version ([^\s)]+)[^)]*\)\s+is\s+(\w+)")
        .unwrap()
});

static ROW_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s+total\.?\s*$").unwrap()
});

static PROFILE_CALLS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((\d+)\)").unwrap());

static PROFILE_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s+profiles?\b").unwrap()
});

const CURRENT_CALLS: FieldSpec = FieldSpec::gauge("current_calls", "Calls currently in progress.");
const CURRENT_CHANNELS: FieldSpec =
    FieldSpec::gauge("current_channels", "Channels currently open.");
const REGISTRATIONS: FieldSpec =
    FieldSpec::gauge("registrations", "Active SIP registrations.");

const PROFILE_RUNNING: FieldSpec =
    FieldSpec::gauge("sofia_profile_running", "Whether the SIP profile is running.");
const PROFILE_CALLS_FIELD: FieldSpec =
    FieldSpec::gauge("sofia_profile_calls", "Calls on the SIP profile.");
const GATEWAY_REGISTERED: FieldSpec = FieldSpec::gauge(
    "sofia_gateway_registered",
    "Whether the SIP gateway is registered (REGED).",
);
const PROFILES: FieldSpec = FieldSpec::gauge("sofia_profiles", "Configured SIP profiles.");

const CHANNEL_INFO: FieldSpec =
    FieldSpec::gauge("channel_info", "Active call leg, described by its labels.");

/// Channel variables read from `uuid_dump`, keyed by variable name.
pub const MEDIA_STATS_FIELDS: &[(&str, FieldSpec)] = &[
    (
        "rtp_audio_in_raw_bytes",
        FieldSpec::counter("rtp_audio_in_raw_bytes", "Inbound RTP bytes including headers."),
    ),
    (
        "rtp_audio_in_media_bytes",
        FieldSpec::counter("rtp_audio_in_media_bytes", "Inbound RTP payload bytes."),
    ),
    (
        "rtp_audio_in_packet_count",
        FieldSpec::counter("rtp_audio_in_packets", "Inbound RTP packets."),
    ),
    (
        "rtp_audio_in_media_packet_count",
        FieldSpec::counter("rtp_audio_in_media_packets", "Inbound RTP media packets."),
    ),
    (
        "rtp_audio_in_skip_packet_count",
        FieldSpec::counter("rtp_audio_in_skip_packets", "Inbound RTP packets skipped."),
    ),
    (
        "rtp_audio_in_jitter_packet_count",
        FieldSpec::counter(
            "rtp_audio_in_jitter_packets",
            "Inbound RTP packets handled by the jitter buffer.",
        ),
    ),
    (
        "rtp_audio_in_dtmf_packet_count",
        FieldSpec::counter("rtp_audio_in_dtmf_packets", "Inbound RTP DTMF packets."),
    ),
    (
        "rtp_audio_in_cng_packet_count",
        FieldSpec::counter("rtp_audio_in_cng_packets", "Inbound comfort-noise packets."),
    ),
    (
        "rtp_audio_in_flush_packet_count",
        FieldSpec::counter("rtp_audio_in_flush_packets", "Inbound RTP packets flushed."),
    ),
    (
        "rtp_audio_in_flaw_total",
        FieldSpec::counter("rtp_audio_in_flaws", "Inbound RTP stream flaws."),
    ),
    (
        "rtp_audio_in_largest_jb_size",
        FieldSpec::gauge(
            "rtp_audio_in_largest_jb_size",
            "Largest jitter buffer size reached.",
        ),
    ),
    (
        "rtp_audio_in_jitter_min_variance",
        FieldSpec::gauge("rtp_audio_in_jitter_min_variance", "Minimum jitter variance."),
    ),
    (
        "rtp_audio_in_jitter_max_variance",
        FieldSpec::gauge("rtp_audio_in_jitter_max_variance", "Maximum jitter variance."),
    ),
    (
        "rtp_audio_in_jitter_loss_rate",
        FieldSpec::gauge("rtp_audio_in_jitter_loss_rate", "Jitter buffer loss rate."),
    ),
    (
        "rtp_audio_in_jitter_burst_rate",
        FieldSpec::gauge("rtp_audio_in_jitter_burst_rate", "Jitter buffer burst rate."),
    ),
    (
        "rtp_audio_in_mean_interval",
        FieldSpec::gauge("rtp_audio_in_mean_interval", "Mean packet interval."),
    ),
    (
        "rtp_audio_in_quality_percentage",
        FieldSpec::gauge("rtp_audio_in_quality_percentage", "Inbound audio quality."),
    ),
    (
        "rtp_audio_in_mos",
        FieldSpec::gauge("rtp_audio_in_mos", "Inbound audio mean opinion score."),
    ),
    (
        "rtp_audio_out_raw_bytes",
        FieldSpec::counter("rtp_audio_out_raw_bytes", "Outbound RTP bytes including headers."),
    ),
    (
        "rtp_audio_out_media_bytes",
        FieldSpec::counter("rtp_audio_out_media_bytes", "Outbound RTP payload bytes."),
    ),
    (
        "rtp_audio_out_packet_count",
        FieldSpec::counter("rtp_audio_out_packets", "Outbound RTP packets."),
    ),
    (
        "rtp_audio_out_media_packet_count",
        FieldSpec::counter("rtp_audio_out_media_packets", "Outbound RTP media packets."),
    ),
    (
        "rtp_audio_out_skip_packet_count",
        FieldSpec::counter("rtp_audio_out_skip_packets", "Outbound RTP packets skipped."),
    ),
    (
        "rtp_audio_out_dtmf_packet_count",
        FieldSpec::counter("rtp_audio_out_dtmf_packets", "Outbound RTP DTMF packets."),
    ),
    (
        "rtp_audio_out_cng_packet_count",
        FieldSpec::counter("rtp_audio_out_cng_packets", "Outbound comfort-noise packets."),
    ),
    (
        "rtp_audio_rtcp_packet_count",
        FieldSpec::counter("rtp_audio_rtcp_packets", "RTCP packets."),
    ),
    (
        "rtp_audio_rtcp_octet_count",
        FieldSpec::counter("rtp_audio_rtcp_octets", "RTCP octets."),
    ),
];

/// Parse one command's body into samples.
pub fn parse(kind: CommandKind, body: &str) -> Result<Vec<MetricSample>, ParseError> {
    if body.trim().is_empty() {
        return Err(ParseError::Empty(kind));
    }

    match kind {
        CommandKind::Status => parse_status(body),
        CommandKind::CallsCount => parse_row_count(kind, body, &CURRENT_CALLS),
        CommandKind::ChannelsCount => parse_row_count(kind, body, &CURRENT_CHANNELS),
        CommandKind::RegistrationsCount => parse_row_count(kind, body, &REGISTRATIONS),
        CommandKind::SofiaStatus => parse_sofia_status(body),
        CommandKind::Channels => parse_channels(body),
        CommandKind::MediaStats => parse_media_stats(body),
    }
}

fn parse_status(body: &str) -> Result<Vec<MetricSample>, ParseError> {
    let mut samples = Vec::new();
    let mut saw_uptime = false;

    for line in body.lines().map(str::trim) {
        if line.starts_with("UP ") {
            if let Some(seconds) = parse_uptime(line) {
                samples.push(UPTIME.sample(seconds));
                saw_uptime = true;
            }
            continue;
        }

        if let Some(caps) = VERSION_LINE.captures(line) {
            samples.push(VERSION_INFO.sample(1.0).with_label("version", &caps[1]));
            let ready = if &caps[2] == "ready" { 1.0 } else { 0.0 };
            samples.push(READY.sample(ready));
            continue;
        }

        let Some((rule, caps)) = STATUS_RULES
            .iter()
            .find_map(|rule| rule.pattern.captures(line).map(|caps| (rule, caps)))
        else {
            continue;
        };

        for (i, (field, conversion)) in rule.fields.iter().enumerate() {
            if let Some(value) = caps
                .get(i + 1)
                .and_then(|m| conversion.apply(m.as_str()))
            {
                samples.push(field.sample(value));
            }
        }
    }

    if !saw_uptime {
        return Err(ParseError::Missing {
            kind: CommandKind::Status,
            missing: "uptime line",
        });
    }

    Ok(samples)
}

/// Parse `UP 0 years, 1 day, 2 hours, ...` into seconds.
pub fn parse_uptime(line: &str) -> Option<f64> {
    let mut seconds = 0.0;
    let mut matched = false;

    for caps in UPTIME_PART.captures_iter(line) {
        let Ok(n) = caps[1].parse::<u64>() else {
            continue;
        };
        let unit = match &caps[2] {
            "year" => 365.0 * 86_400.0,
            "day" => 86_400.0,
            "hour" => 3_600.0,
            "minute" => 60.0,
            "second" => 1.0,
            "millisecond" => 1e-3,
            "microsecond" => 1e-6,
            _ => continue,
        };
        seconds += n as f64 * unit;
        matched = true;
    }

    matched.then_some(seconds)
}

fn parse_row_count(
    kind: CommandKind,
    body: &str,
    field: &FieldSpec,
) -> Result<Vec<MetricSample>, ParseError> {
    body.lines()
        .find_map(|line| ROW_COUNT.captures(line))
        .and_then(|caps| parse_number(&caps[1]))
        .map(|count| vec![field.sample(count)])
        .ok_or(ParseError::Missing {
            kind,
            missing: "row count",
        })
}

fn parse_sofia_status(body: &str) -> Result<Vec<MetricSample>, ParseError> {
    if !body.lines().any(|line| line.trim_start().starts_with("====")) {
        return Err(ParseError::Missing {
            kind: CommandKind::SofiaStatus,
            missing: "table separator",
        });
    }

    let mut samples = Vec::new();

    for line in body.lines() {
        if let Some(caps) = PROFILE_COUNT.captures(line) {
            if let Some(count) = parse_number(&caps[1]) {
                samples.push(PROFILES.sample(count));
            }
            continue;
        }

        let columns: Vec<&str> = line.split('\t').map(str::trim).collect();
        let [name, kind, _data, state] = columns.as_slice() else {
            continue;
        };

        match *kind {
            "profile" => {
                let running = if state.starts_with("RUNNING") { 1.0 } else { 0.0 };
                samples.push(PROFILE_RUNNING.sample(running).with_label("profile", *name));
                if let Some(calls) = PROFILE_CALLS
                    .captures(state)
                    .and_then(|caps| parse_number(&caps[1]))
                {
                    samples.push(PROFILE_CALLS_FIELD.sample(calls).with_label("profile", *name));
                }
            }
            "gateway" => {
                let (profile, gateway) = name.split_once("::").unwrap_or(("", *name));
                let state = state.split_whitespace().next().unwrap_or_default();
                let registered = if state == "REGED" { 1.0 } else { 0.0 };
                samples.push(
                    GATEWAY_REGISTERED
                        .sample(registered)
                        .with_label("profile", profile)
                        .with_label("gateway", gateway),
                );
            }
            // Aliases, the header row and unknown entity types.
            _ => {}
        }
    }

    Ok(samples)
}

/// One row of `show channels as json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelRow {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub callstate: String,
    #[serde(default)]
    pub read_codec: String,
    #[serde(default)]
    pub write_codec: String,
}

#[derive(Debug, Deserialize)]
struct ChannelList {
    row_count: u64,
    #[serde(default)]
    rows: Vec<ChannelRow>,
}

/// Read the active call legs from `show channels as json`.
pub fn channel_rows(body: &str) -> Result<Vec<ChannelRow>, ParseError> {
    let list: ChannelList = serde_json::from_str(body.trim()).map_err(|e| ParseError::Json {
        kind: CommandKind::Channels,
        message: e.to_string(),
    })?;

    if list.rows.len() as u64 != list.row_count {
        tracing::debug!(
            row_count = list.row_count,
            rows = list.rows.len(),
            "Channel row count does not match rows"
        );
    }

    Ok(list
        .rows
        .into_iter()
        .filter(|row| !row.uuid.is_empty())
        .collect())
}

fn parse_channels(body: &str) -> Result<Vec<MetricSample>, ParseError> {
    Ok(channel_rows(body)?
        .into_iter()
        .map(|row| {
            CHANNEL_INFO
                .sample(1.0)
                .with_label("uuid", row.uuid)
                .with_label("direction", row.direction)
                .with_label("callstate", row.callstate)
                .with_label("read_codec", row.read_codec)
                .with_label("write_codec", row.write_codec)
        })
        .collect())
}

fn parse_media_stats(body: &str) -> Result<Vec<MetricSample>, ParseError> {
    let dump: serde_json::Map<String, Value> =
        serde_json::from_str(body.trim()).map_err(|e| ParseError::Json {
            kind: CommandKind::MediaStats,
            message: e.to_string(),
        })?;

    let uuid = dump
        .get("Unique-ID")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::Missing {
            kind: CommandKind::MediaStats,
            missing: "Unique-ID",
        })?;

    let samples = MEDIA_STATS_FIELDS
        .iter()
        .filter_map(|(variable, field)| {
            let raw = dump
                .get(&format!("variable_{}", variable))
                .or_else(|| dump.get(*variable))?;
            let value = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => parse_number(s),
                _ => None,
            }?;
            Some(field.sample(value).with_label("uuid", uuid))
        })
        .collect();

    Ok(samples)
}

/// Parse an integer or decimal; integers are read exactly first.
pub fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n as f64);
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse `240K`, `8192K`, `16M`, `1G` or a plain number into bytes.
pub fn parse_size(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.chars().last()? {
        'K' | 'k' => (&raw[..raw.len() - 1], 1024.0),
        'M' | 'm' => (&raw[..raw.len() - 1], 1024.0 * 1024.0),
        'G' | 'g' => (&raw[..raw.len() - 1], 1024.0 * 1024.0 * 1024.0),
        _ => (raw, 1.0),
    };
    parse_number(digits).map(|n| n * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS_BODY: &str = "UP 0 years, 1 day, 2 hours, 3 minutes, 4 seconds, 500 milliseconds, 0 microseconds
FreeSWITCH (Version 1.10.7-release git 883d2cb 2021-10-25 17:24:32Z 64bit) is ready
2134 session(s) since startup
3 session(s) - peak 12, last 5min 4
1 session(s) per Sec out of max 30, peak 6, last 5min 2
1000 session(s) max
min idle cpu 0.00/97.63
Current Stack Size/Max 240K/8192K
";

    const SOFIA_BODY: &str = "                     Name\t   Type\t                                       Data\tState
=================================================================================================
            external\tprofile\t          sip:mod_sofia@10.0.0.1:5080\tRUNNING (2)
  external::carrier-a\tgateway\t                sip:trunk@carrier-a.example\tREGED
  external::carrier-b\tgateway\t                sip:trunk@carrier-b.example\tFAIL_WAIT
            10.0.0.1\t  alias\t                                   internal\tALIASED
            internal\tprofile\t          sip:mod_sofia@10.0.0.1:5060\tRUNNING (0)
=================================================================================================
2 profiles 1 alias
";

    fn value_of(samples: &[MetricSample], name: &str) -> Option<f64> {
        samples.iter().find(|s| s.name == name).map(|s| s.value)
    }

    fn labeled<'a>(
        samples: &'a [MetricSample],
        name: &str,
        label: (&str, &str),
    ) -> Option<&'a MetricSample> {
        samples.iter().find(|s| {
            s.name == name && s.labels.iter().any(|(k, v)| k == label.0 && v == label.1)
        })
    }

    #[test]
    fn test_parse_status() {
        let samples = parse(CommandKind::Status, STATUS_BODY).unwrap();

        assert_eq!(
            value_of(&samples, "uptime_seconds"),
            Some(86_400.0 + 7_200.0 + 180.0 + 4.0 + 0.5)
        );
        assert_eq!(value_of(&samples, "ready"), Some(1.0));
        assert_eq!(value_of(&samples, "sessions"), Some(2134.0));
        assert_eq!(value_of(&samples, "current_sessions"), Some(3.0));
        assert_eq!(value_of(&samples, "sessions_peak"), Some(12.0));
        assert_eq!(value_of(&samples, "sessions_peak_5min"), Some(4.0));
        assert_eq!(value_of(&samples, "current_sps"), Some(1.0));
        assert_eq!(value_of(&samples, "max_sps"), Some(30.0));
        assert_eq!(value_of(&samples, "sps_peak"), Some(6.0));
        assert_eq!(value_of(&samples, "sps_peak_5min"), Some(2.0));
        assert_eq!(value_of(&samples, "max_sessions"), Some(1000.0));
        assert_eq!(value_of(&samples, "min_idle_cpu"), Some(0.0));
        assert_eq!(value_of(&samples, "idle_cpu"), Some(97.63));
        assert_eq!(value_of(&samples, "stack_size_bytes"), Some(240.0 * 1024.0));
        assert_eq!(
            value_of(&samples, "stack_size_max_bytes"),
            Some(8192.0 * 1024.0)
        );

        let version = labeled(&samples, "version_info", ("version", "1.10.7-release")).unwrap();
        assert_eq!(version.value, 1.0);

        let sessions = samples.iter().find(|s| s.name == "sessions").unwrap();
        assert_eq!(sessions.kind, MetricKind::Counter);
    }

    #[test]
    fn test_parse_status_skips_unknown_lines() {
        let body = "UP 0 years, 0 days, 0 hours, 0 minutes, 10 seconds\n\
                    some brand new line 42\n\
                    7 session(s) since startup\n";
        let samples = parse(CommandKind::Status, body).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(value_of(&samples, "uptime_seconds"), Some(10.0));
        assert_eq!(value_of(&samples, "sessions"), Some(7.0));
    }

    #[test]
    fn test_parse_status_not_ready() {
        let body = "UP 0 years, 0 days\nFreeSWITCH (Version 1.10.9 64bit) is not ready\n";
        let samples = parse(CommandKind::Status, body).unwrap();
        // "is not ready" captures "not".
        assert_eq!(value_of(&samples, "ready"), Some(0.0));
    }

    #[test]
    fn test_parse_status_requires_uptime() {
        let err = parse(CommandKind::Status, "2134 session(s) since startup\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::Missing {
                kind: CommandKind::Status,
                missing: "uptime line"
            }
        );
    }

    #[test]
    fn test_parse_empty_body() {
        for kind in CommandKind::BASELINE {
            assert_eq!(parse(*kind, " \n"), Err(ParseError::Empty(*kind)));
        }
    }

    #[test]
    fn test_parse_uptime() {
        assert_eq!(parse_uptime("UP 1 year, 0 days"), Some(365.0 * 86_400.0));
        assert_eq!(
            parse_uptime("UP 0 years, 0 days, 0 hours, 0 minutes, 0 seconds, 0 milliseconds, 250 microseconds"),
            Some(250e-6)
        );
        assert_eq!(parse_uptime("UP forever"), None);
    }

    #[test]
    fn test_parse_counts() {
        let samples = parse(CommandKind::CallsCount, "\n3 total.\n").unwrap();
        assert_eq!(samples, vec![CURRENT_CALLS.sample(3.0)]);

        let samples = parse(CommandKind::ChannelsCount, "\n0 total.\n").unwrap();
        assert_eq!(value_of(&samples, "current_channels"), Some(0.0));

        let samples = parse(CommandKind::RegistrationsCount, "12 total.").unwrap();
        assert_eq!(value_of(&samples, "registrations"), Some(12.0));
    }

    #[test]
    fn test_parse_count_missing_total() {
        let err = parse(CommandKind::CallsCount, "uuid,direction,created\n").unwrap_err();
        assert!(matches!(err, ParseError::Missing { missing: "row count", .. }));
    }

    #[test]
    fn test_parse_sofia_status() {
        let samples = parse(CommandKind::SofiaStatus, SOFIA_BODY).unwrap();

        let external = labeled(&samples, "sofia_profile_running", ("profile", "external")).unwrap();
        assert_eq!(external.value, 1.0);
        let calls = labeled(&samples, "sofia_profile_calls", ("profile", "external")).unwrap();
        assert_eq!(calls.value, 2.0);

        let gw_a = labeled(&samples, "sofia_gateway_registered", ("gateway", "carrier-a")).unwrap();
        assert_eq!(gw_a.value, 1.0);
        assert!(gw_a.labels.contains(&("profile".to_string(), "external".to_string())));
        let gw_b = labeled(&samples, "sofia_gateway_registered", ("gateway", "carrier-b")).unwrap();
        assert_eq!(gw_b.value, 0.0);

        assert_eq!(value_of(&samples, "sofia_profiles"), Some(2.0));

        // The alias row and header row produce nothing.
        assert!(!samples.iter().any(|s| s.labels.iter().any(|(_, v)| v == "10.0.0.1")));
        assert_eq!(samples.len(), 2 + 2 + 2 + 1);
    }

    #[test]
    fn test_parse_sofia_status_requires_table() {
        let err = parse(CommandKind::SofiaStatus, "Invalid Profile!\n").unwrap_err();
        assert!(matches!(err, ParseError::Missing { missing: "table separator", .. }));
    }

    #[test]
    fn test_parse_channels() {
        let body = r#"{"row_count":2,"rows":[
            {"uuid":"a-1","direction":"inbound","callstate":"ACTIVE","read_codec":"PCMU","write_codec":"PCMU","name":"sofia/internal/1000"},
            {"uuid":"b-2","direction":"outbound","callstate":"RINGING","read_codec":"","write_codec":""}
        ]}"#;

        let samples = parse(CommandKind::Channels, body).unwrap();
        assert_eq!(samples.len(), 2);
        let leg = labeled(&samples, "channel_info", ("uuid", "a-1")).unwrap();
        assert!(leg.labels.contains(&("read_codec".to_string(), "PCMU".to_string())));
        assert!(leg.labels.contains(&("direction".to_string(), "inbound".to_string())));
    }

    #[test]
    fn test_channel_rows_without_calls() {
        assert!(channel_rows(r#"{"row_count":0}"#).unwrap().is_empty());
    }

    #[test]
    fn test_channel_rows_invalid_json() {
        let err = channel_rows("0 total.").unwrap_err();
        assert!(matches!(err, ParseError::Json { kind: CommandKind::Channels, .. }));

        let err = channel_rows(r#"{"rows":[]}"#).unwrap_err();
        assert!(matches!(err, ParseError::Json { .. }));
    }

    #[test]
    fn test_parse_media_stats() {
        let body = r#"{
            "Unique-ID": "a-1",
            "Channel-State": "CS_EXECUTE",
            "variable_rtp_audio_in_raw_bytes": "17200",
            "variable_rtp_audio_in_media_packet_count": "100",
            "variable_rtp_audio_in_mos": "4.42",
            "variable_rtp_audio_out_raw_bytes": 17400,
            "variable_rtp_audio_in_jitter_loss_rate": "n/a"
        }"#;

        let samples = parse(CommandKind::MediaStats, body).unwrap();

        assert_eq!(samples.len(), 4);
        assert!(samples
            .iter()
            .all(|s| s.labels == vec![("uuid".to_string(), "a-1".to_string())]));
        assert_eq!(value_of(&samples, "rtp_audio_in_raw_bytes"), Some(17200.0));
        assert_eq!(value_of(&samples, "rtp_audio_in_media_packets"), Some(100.0));
        assert_eq!(value_of(&samples, "rtp_audio_in_mos"), Some(4.42));
        assert_eq!(value_of(&samples, "rtp_audio_out_raw_bytes"), Some(17400.0));
        // Non-numeric values are dropped, not zero-filled.
        assert_eq!(value_of(&samples, "rtp_audio_in_jitter_loss_rate"), None);
    }

    #[test]
    fn test_parse_media_stats_requires_uuid() {
        let err = parse(CommandKind::MediaStats, r#"{"variable_rtp_audio_in_mos":"4"}"#).unwrap_err();
        assert!(matches!(err, ParseError::Missing { missing: "Unique-ID", .. }));
    }

    #[test]
    fn test_parse_number_and_size() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number(" 97.63 "), Some(97.63));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("NaN"), None);

        assert_eq!(parse_size("240K"), Some(245_760.0));
        assert_eq!(parse_size("2M"), Some(2_097_152.0));
        assert_eq!(parse_size("512"), Some(512.0));
        assert_eq!(parse_size("K"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn test_media_stats_metric_names_unique() {
        let mut names: Vec<_> = MEDIA_STATS_FIELDS.iter().map(|(_, f)| f.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), MEDIA_STATS_FIELDS.len());
    }

    #[test]
    fn test_status_rules_match_capture_groups() {
        for rule in STATUS_RULES.iter() {
            assert_eq!(
                rule.pattern.captures_len() - 1,
                rule.fields.len(),
                "{}",
                rule.pattern
            );
        }
    }
}
