//! Request and response values exchanged between clients and replicas

use crate::clock::{Clock, ReplicaId};
use bank_ledger::{AccountId, Amount};
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::BTreeMap, fmt};

/// Ledger operation carried by a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    CreateAccount { uid: AccountId },
    GetBalance { uid: AccountId },
    Deposit { uid: AccountId, amount: Amount },
    Transfer { from: AccountId, to: AccountId, amount: Amount },
    Halt,
    /// Any kind this build does not recognize; executes as a no-op
    #[serde(other)]
    #[default]
    Unknown,
}

impl Operation {
    /// Name used in logs and events
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateAccount { .. } => "CREATE_ACCOUNT",
            Operation::GetBalance { .. } => "GET_BALANCE",
            Operation::Deposit { .. } => "DEPOSIT",
            Operation::Transfer { .. } => "TRANSFER",
            Operation::Halt => "HALT",
            Operation::Unknown => "UNKNOWN",
        }
    }

    /// Whether the operation goes through propose/commit
    pub fn is_ordered(&self) -> bool {
        !matches!(self, Operation::GetBalance { .. })
    }
}

impl fmt::Display for Operation {
    /// Parameters only, e.g. `from=1, to=2, amount=100`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAccount { uid } | Operation::GetBalance { uid } => {
                write!(f, "uid={}", uid)
            }
            Operation::Deposit { uid, amount } => write!(f, "uid={}, amount={}", uid, amount),
            Operation::Transfer { from, to, amount } => {
                write!(f, "from={}, to={}, amount={}", from, to, amount)
            }
            Operation::Halt | Operation::Unknown => Ok(()),
        }
    }
}

/// A client operation, optionally stamped with its logical clock.
///
/// Values are built once and never mutated; stamping or relabeling returns a new
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, deserialize_with = "lenient_operation")]
    op: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clock: Option<Clock>,
    #[serde(default)]
    origin: String,
}

impl Request {
    pub fn new(op: Operation, origin: impl Into<String>) -> Self {
        Self {
            op,
            clock: None,
            origin: origin.into(),
        }
    }

    pub fn create_account(uid: AccountId, origin: impl Into<String>) -> Self {
        Self::new(Operation::CreateAccount { uid }, origin)
    }

    pub fn get_balance(uid: AccountId, origin: impl Into<String>) -> Self {
        Self::new(Operation::GetBalance { uid }, origin)
    }

    pub fn deposit(uid: AccountId, amount: Amount, origin: impl Into<String>) -> Self {
        Self::new(Operation::Deposit { uid, amount }, origin)
    }

    pub fn transfer(
        from: AccountId,
        to: AccountId,
        amount: Amount,
        origin: impl Into<String>,
    ) -> Self {
        Self::new(Operation::Transfer { from, to, amount }, origin)
    }

    pub fn halt(origin: impl Into<String>) -> Self {
        Self::new(Operation::Halt, origin)
    }

    /// Copy of this request carrying `clock`
    pub fn stamped(&self, clock: Clock) -> Self {
        Self {
            clock: Some(clock),
            ..self.clone()
        }
    }

    /// Copy of this request with a different origin label
    pub fn relabeled(&self, origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..self.clone()
        }
    }

    pub fn op(&self) -> Operation {
        self.op
    }

    pub fn clock(&self) -> Option<Clock> {
        self.clock
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// Read `op`, turning anything that is not a well-formed operation into `Unknown`
fn lenient_operation<'de, D>(deserializer: D) -> Result<Operation, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.clock {
            Some(clock) => write!(f, "{} {} {}", clock, self.op.name(), self.op),
            None => write!(f, "[-] {} {}", self.op.name(), self.op),
        }
    }
}

/// Audit produced by a replica when it executes `Halt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltReport {
    pub replica: ReplicaId,
    /// Final balance of every account, ascending by id
    pub balances: BTreeMap<AccountId, Amount>,
    pub total: Amount,
    /// Requests still queued when the replica halted
    pub pending: Vec<Request>,
    /// Mean latency of client requests this replica coordinated
    pub avg_request_secs: Option<f64>,
}

/// Result payload of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    CreateAccount { uid: AccountId },
    GetBalance { balance: Amount },
    Deposit { success: bool },
    Transfer { success: bool },
    Halt { report: HaltReport },
    /// Peer acknowledgement of a proposal
    Ack,
    /// Reply to malformed or unrecognized traffic
    Empty,
}

/// Reply to a request, echoing its clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clock: Option<Clock>,
    outcome: Outcome,
}

impl Response {
    pub fn new(clock: Option<Clock>, outcome: Outcome) -> Self {
        Self { clock, outcome }
    }

    pub fn ack(clock: Clock) -> Self {
        Self::new(Some(clock), Outcome::Ack)
    }

    pub fn empty(clock: Option<Clock>) -> Self {
        Self::new(clock, Outcome::Empty)
    }

    pub fn clock(&self) -> Option<Clock> {
        self.clock
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Balance, for `GetBalance` responses
    pub fn balance(&self) -> Option<Amount> {
        match self.outcome {
            Outcome::GetBalance { balance } => Some(balance),
            _ => None,
        }
    }

    /// Success flag, for `Deposit` and `Transfer` responses
    pub fn success(&self) -> Option<bool> {
        match self.outcome {
            Outcome::Deposit { success } | Outcome::Transfer { success } => Some(success),
            _ => None,
        }
    }

    /// Created id, for `CreateAccount` responses
    pub fn uid(&self) -> Option<AccountId> {
        match self.outcome {
            Outcome::CreateAccount { uid } => Some(uid),
            _ => None,
        }
    }

    pub fn halt_report(&self) -> Option<&HaltReport> {
        match &self.outcome {
            Outcome::Halt { report } => Some(report),
            _ => None,
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self.outcome, Outcome::Ack)
    }
}
