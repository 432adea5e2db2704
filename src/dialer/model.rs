use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates the text codec used for provider payloads and database columns.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Lifecycle status of an outbound call, as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
}

text_enum!(CallStatus {
    Queued => "queued",
    Initiated => "initiated",
    Ringing => "ringing",
    InProgress => "in-progress",
    Completed => "completed",
    Busy => "busy",
    Failed => "failed",
    NoAnswer => "no-answer",
    Canceled => "canceled",
});

impl CallStatus {
    /// Position in the lifecycle. A call only ever moves to a higher rank.
    pub fn rank(&self) -> i16 {
        match self {
            Self::Queued => 0,
            Self::Initiated => 1,
            Self::Ringing => 2,
            Self::InProgress => 3,
            Self::Completed | Self::Busy | Self::Failed | Self::NoAnswer | Self::Canceled => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 4
    }

    pub fn can_advance_to(&self, next: CallStatus) -> bool {
        next.rank() > self.rank()
    }
}

/// Provider answering-machine-detection verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnsweredBy {
    Human,
    Unknown,
    MachineStart,
    MachineEndBeep,
    MachineEndSilence,
    MachineEndOther,
    Fax,
}

text_enum!(AnsweredBy {
    Human => "human",
    Unknown => "unknown",
    MachineStart => "machine_start",
    MachineEndBeep => "machine_end_beep",
    MachineEndSilence => "machine_end_silence",
    MachineEndOther => "machine_end_other",
    Fax => "fax",
});

impl AnsweredBy {
    pub fn is_machine(&self) -> bool {
        matches!(
            self,
            Self::MachineStart
                | Self::MachineEndBeep
                | Self::MachineEndSilence
                | Self::MachineEndOther
        )
    }
}

/// What the dialer did with an answered call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Pending,
    Connected,
    Queued,
    Voicemail,
    Rejected,
}

text_enum!(Disposition {
    Pending => "pending",
    Connected => "connected",
    Queued => "queued",
    Voicemail => "voicemail",
    Rejected => "rejected",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Pending,
    Dialing,
    Connected,
    Voicemail,
    Completed,
    Busy,
    NoAnswer,
    Failed,
}

text_enum!(ContactStatus {
    Pending => "pending",
    Dialing => "dialing",
    Connected => "connected",
    Voicemail => "voicemail",
    Completed => "completed",
    Busy => "busy",
    NoAnswer => "no_answer",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Offline,
    Available,
    Busy,
}

text_enum!(AgentStatus {
    Offline => "offline",
    Available => "available",
    Busy => "busy",
});

/// A lead the dialer can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub campaign_id: Option<String>,
    pub name: String,
    pub phone: String,
    pub status: ContactStatus,
    pub attempts: i32,
    pub last_called_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(name: String, phone: String, campaign_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            name,
            phone,
            status: ContactStatus::Pending,
            attempts: 0,
            last_called_at: None,
            created_at: Utc::now(),
        }
    }

    /// Used to personalize the voicemail drop.
    pub fn first_name(&self) -> Option<&str> {
        self.name.split_whitespace().next()
    }
}

/// A person taking calls through the browser client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    /// Client identity the provider rings when bridging a call.
    pub identity: String,
    pub name: Option<String>,
    pub status: AgentStatus,
    pub current_call_sid: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One outbound call leg, keyed by the provider's call SID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub sid: String,
    pub contact_id: Uuid,
    pub agent_id: Option<String>,
    pub status: CallStatus,
    pub answered_by: Option<AnsweredBy>,
    pub disposition: Disposition,
    pub duration_secs: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Call {
    pub fn placed(sid: String, contact_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            sid,
            contact_id,
            agent_id: None,
            status: CallStatus::Queued,
            answered_by: None,
            disposition: Disposition::Pending,
            duration_secs: None,
            created_at: now,
            updated_at: now,
            ended_at: None,
        }
    }
}

/// An answered human waiting for an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedCall {
    pub call_sid: String,
    pub enqueued_at: DateTime<Utc>,
}
