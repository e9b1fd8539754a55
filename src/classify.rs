//! Folds each visit's event log into a fixed-shape [`VisitSummary`].

use chrono::DateTime;
use std::fmt;

use crate::model::{ActionEvent, Intent, Visit, VisitorProfile};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginKind {
    Real,
    Archetype,
    #[default]
    NotAvailable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionOutcome {
    #[default]
    None,
    Wifi,
    Bye,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SmsOutcome {
    Yes,
    No,
    #[default]
    NotAvailable,
}

impl fmt::Display for LoginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoginKind::Real => "REAL",
            LoginKind::Archetype => "ARCHETYPE",
            LoginKind::NotAvailable => NOT_AVAILABLE,
        })
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionOutcome::None => "NONE",
            SessionOutcome::Wifi => "WIFI",
            SessionOutcome::Bye => "BYE",
        })
    }
}

impl fmt::Display for SmsOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SmsOutcome::Yes => "YES",
            SmsOutcome::No => "NO",
            SmsOutcome::NotAvailable => NOT_AVAILABLE,
        })
    }
}

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitSummary {
    pub user_id: String,
    /// Server timestamp of the visit, seconds since the epoch.
    pub timestamp: i64,
    pub time: String,
    /// Seconds.
    pub duration: u64,
    pub login: LoginKind,
    pub actions: u32,
    pub rating: Option<String>,
    pub outcome: SessionOutcome,
    pub sms: SmsOutcome,

    // intent counters
    pub channel_change: u32,
    pub from_beginning: u32,
    pub tv_info: u32,
    pub recommendation: u32,
    pub search: u32,
    pub wifi: u32,
}

impl VisitSummary {
    pub fn from_visit(user_id: &str, visit: &Visit) -> Self {
        let mut s = VisitSummary {
            user_id: user_id.to_string(),
            timestamp: visit.server_timestamp,
            time: visit.server_time_pretty.clone(),
            ..Default::default()
        };

        for action in &visit.action_details {
            match action {
                ActionEvent::UserType { real } => {
                    s.login = if *real {
                        LoginKind::Real
                    } else {
                        LoginKind::Archetype
                    };
                }
                ActionEvent::Session { duration } => {
                    s.duration = duration
                        .filter(|d| *d != 0)
                        .or(visit.visit_duration)
                        .unwrap_or(0);
                }
                ActionEvent::SmsRequest { accepted } => {
                    s.sms = if *accepted {
                        SmsOutcome::Yes
                    } else {
                        SmsOutcome::No
                    };
                }
                ActionEvent::Rating { value } => {
                    if let Some(value) = value {
                        s.rating = Some(value.clone());
                    }
                }
                ActionEvent::NetworkStatus { goodbye } => {
                    if *goodbye {
                        s.outcome = SessionOutcome::Wifi;
                    }
                }
                ActionEvent::Intent(intent) => s.record_intent(*intent),
                ActionEvent::Unrecognized => {}
            }
        }

        s
    }

    fn record_intent(&mut self, intent: Intent) {
        match intent {
            Intent::ChannelChange => self.channel_change += 1,
            Intent::FromBeginning => self.from_beginning += 1,
            Intent::Search => self.search += 1,
            Intent::Recommendation => self.recommendation += 1,
            Intent::TvInfo => self.tv_info += 1,
            Intent::Wifi => {
                self.wifi += 1;
                self.outcome = SessionOutcome::Wifi;
            }
            Intent::Goodbye => {
                self.outcome = SessionOutcome::Bye;
                return;
            }
        }
        self.actions += 1;
    }

    pub fn rating_text(&self) -> &str {
        self.rating.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn formatted_date(&self) -> String {
        format_date(self.timestamp)
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration)
    }
}

/// Summarizes every visit, in visitor order and then visit order.
pub fn classify(profiles: &[VisitorProfile]) -> Vec<VisitSummary> {
    profiles
        .iter()
        .flat_map(|profile| {
            let user_id = profile.user_id.as_deref().unwrap_or_default();
            profile
                .last_visits
                .iter()
                .map(move |visit| VisitSummary::from_visit(user_id, visit))
        })
        .collect()
}

/// `MM:SS`; minutes keep counting past the hour.
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// ISO-8601 UTC with millisecond precision, e.g. `2017-05-10T10:15:00.000Z`.
pub fn format_date(timestamp: i64) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => timestamp.to_string(),
    }
}
