//! Visitor profiles as returned by `Live.getVisitorProfile`.
//!
//! Visits and profiles are strictly typed. Action details are not: Piwik mixes
//! page views, downloads and custom events in the same array, so each entry is
//! read leniently into an [`ActionEvent`] and anything unexpected becomes
//! [`ActionEvent::Unrecognized`].

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorProfile {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub last_visits: Vec<Visit>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    /// Seconds since the epoch.
    #[serde(deserialize_with = "lenient_i64")]
    pub server_timestamp: i64,
    #[serde(default)]
    pub server_time_pretty: String,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub visit_duration: Option<u64>,
    #[serde(default)]
    pub action_details: Vec<ActionEvent>,
}

/// Intent sub-tags recorded under the `intent` category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ChannelChange,
    FromBeginning,
    Search,
    Recommendation,
    TvInfo,
    Wifi,
    Goodbye,
}

impl Intent {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "desco_change_channel" => Some(Intent::ChannelChange),
            "desco_from_beginning" => Some(Intent::FromBeginning),
            "tv_search" => Some(Intent::Search),
            "tv_profiling" => Some(Intent::Recommendation),
            "desco_info" => Some(Intent::TvInfo),
            "wifi_info" | "wifi_password" => Some(Intent::Wifi),
            "goodbye" => Some(Intent::Goodbye),
            _ => None,
        }
    }
}

/// One recorded event of a visit, keyed by `eventAction` then `eventName`.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    /// `user_type`: whether the visitor logged in with a real account.
    UserType { real: bool },
    /// `session`: the session length in seconds, when the event carries one.
    Session { duration: Option<u64> },
    /// `sms_requesting`
    SmsRequest { accepted: bool },
    /// `valoration`
    Rating { value: Option<String> },
    /// `wifi`
    NetworkStatus { goodbye: bool },
    Intent(Intent),
    Unrecognized,
}

const LOGIN_REAL: &str = "login_real";
const SMS_ACCEPTED: &str = "accepted";
const GOODBYE: &str = "goodbye";

impl From<&Value> for ActionEvent {
    fn from(action: &Value) -> Self {
        let name = action["eventName"].as_str();
        let value = &action["eventValue"];

        match action["eventAction"].as_str() {
            Some("user_type") => ActionEvent::UserType {
                real: name == Some(LOGIN_REAL),
            },
            Some("session") => ActionEvent::Session {
                duration: value_as_u64(value),
            },
            Some("sms_requesting") => ActionEvent::SmsRequest {
                accepted: name == Some(SMS_ACCEPTED),
            },
            Some("valoration") => ActionEvent::Rating {
                value: value_as_text(value),
            },
            Some("wifi") => ActionEvent::NetworkStatus {
                goodbye: name == Some(GOODBYE),
            },
            Some("intent") => name
                .and_then(Intent::from_name)
                .map_or(ActionEvent::Unrecognized, ActionEvent::Intent),
            _ => ActionEvent::Unrecognized,
        }
    }
}

impl<'de> Deserialize<'de> for ActionEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(ActionEvent::from(&value))
    }
}

/// Reads a non-negative integer from a JSON number or numeric string.
pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f.round() as u64),
        _ => None,
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let timestamp = match &value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    timestamp.ok_or_else(|| serde::de::Error::custom(format!("expected a timestamp, got {value}")))
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_u64(&value))
}
