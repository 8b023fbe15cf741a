//! JSON protocol for headless siege communication.
//!
//! The headless runner communicates via JSON lines (one JSON object per line):
//!
//! **Input (stdin):** Commands from the controller
//! **Output (stdout):** Responses and status snapshots
//!
//! # Protocol Flow
//!
//! 1. Runner starts, outputs `{"type":"ready","version":"1.0","tick":0}`
//! 2. Controller sends commands as JSON lines
//! 3. Runner answers every command; with `--auto-state` it also sends a
//!    status snapshot after every `tick` command
//! 4. When the siege is decided, outputs `{"type":"game_over",...}`
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","tick":0}
//! -> {"cmd":"order","order":{"type":"deployment_target","unit":6,"structure":2}}
//! <- {"type":"ack","cmd":"order"}
//! -> {"cmd":"tick","count":40}
//! <- {"type":"ack","cmd":"tick"}
//! -> {"cmd":"status"}
//! <- {"type":"status","tick":40,"time_ms":2000,"outcome":"in_progress",...}
//! -> {"cmd":"hash"}
//! <- {"type":"state_hash","tick":40,"hash":1234567890}
//! -> {"cmd":"quit"}
//! <- {"type":"bye"}
//! ```

use serde::{Deserialize, Serialize};
use siege_core::orders::Order;
use siege_core::status::{GameOutcome, GameStatus};

/// Protocol version reported in the `ready` response.
pub const PROTOCOL_VERSION: &str = "1.0";

// ============================================================================
// Input Commands (Controller -> Runner)
// ============================================================================

/// Commands that can be sent to the headless runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Advance simulation by N ticks (default: 1).
    Tick {
        /// Ticks to run.
        #[serde(default = "default_tick_count")]
        count: u32,
    },

    /// Give an order to a friendly unit.
    Order {
        /// The order.
        order: Order,
    },

    /// Query the current game status without advancing time.
    Status,

    /// Report the current state hash (for determinism verification).
    Hash,

    /// Quit the session.
    Quit,
}

fn default_tick_count() -> u32 {
    1
}

// ============================================================================
// Output Responses (Runner -> Controller)
// ============================================================================

/// Responses sent from the headless runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Runner is ready to accept commands.
    Ready {
        /// Protocol version.
        version: String,
        /// Tick the session starts at.
        tick: u64,
    },

    /// Acknowledgment of a command.
    Ack {
        /// Name of the acknowledged command.
        cmd: String,
    },

    /// Error processing a command.
    Error {
        /// What went wrong.
        message: String,
        /// Name of the failed command, when it could be parsed.
        cmd: Option<String>,
    },

    /// Snapshot of the game.
    Status(GameStatus),

    /// The siege has been decided.
    GameOver {
        /// Victory or defeat.
        outcome: GameOutcome,
        /// Tick at which it was decided.
        tick: u64,
        /// Simulated time at which it was decided.
        time_ms: u64,
    },

    /// State hash for determinism verification.
    StateHash {
        /// Current tick.
        tick: u64,
        /// Deterministic hash of the simulation state.
        hash: u64,
    },

    /// Goodbye message before shutdown.
    Bye,
}

// ============================================================================
// Helpers
// ============================================================================

impl Response {
    /// Create a ready response.
    pub fn ready(tick: u64) -> Self {
        Self::Ready {
            version: PROTOCOL_VERSION.to_string(),
            tick,
        }
    }

    /// Create an acknowledgment.
    pub fn ack(cmd: &str) -> Self {
        Self::Ack {
            cmd: cmd.to_string(),
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(String::from),
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"type":"error","message":"Serialization failed: {}"}}"#,
                e
            )
        });
        json.push('\n');
        json
    }
}

impl Command {
    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Get command name for acknowledgment.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tick { .. } => "tick",
            Self::Order { .. } => "order",
            Self::Status => "status",
            Self::Hash => "hash",
            Self::Quit => "quit",
        }
    }
}
