//! Checkout step machine
//!
//! `transition` is a pure function over the current step, an event and the
//! guards evaluated by the caller. Rendering and persistence live elsewhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    Address,
    Review,
    Payment,
}

impl CheckoutStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStep::Address => "address",
            CheckoutStep::Review => "review",
            CheckoutStep::Payment => "payment",
        }
    }

    pub fn next(&self) -> Option<CheckoutStep> {
        match self {
            CheckoutStep::Address => Some(CheckoutStep::Review),
            CheckoutStep::Review => Some(CheckoutStep::Payment),
            CheckoutStep::Payment => None,
        }
    }

    pub fn previous(&self) -> Option<CheckoutStep> {
        match self {
            CheckoutStep::Address => None,
            CheckoutStep::Review => Some(CheckoutStep::Address),
            CheckoutStep::Payment => Some(CheckoutStep::Review),
        }
    }
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CheckoutStep {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "address" => Ok(CheckoutStep::Address),
            "review" => Ok(CheckoutStep::Review),
            "payment" => Ok(CheckoutStep::Payment),
            other => Err(format!("unknown checkout step: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Advance,
    Retreat,
    Enter(CheckoutStep),
}

/// Facts the caller checked against live data
#[derive(Debug, Clone, Copy, Default)]
pub struct StepGuards {
    /// A selected address exists and is in the customer's live address list
    pub address_resolvable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRejection {
    AddressRequired,
    /// `advance` from `payment`; submitting is a separate operation
    AlreadyAtFinalStep,
}

impl StepRejection {
    pub fn message(&self) -> &'static str {
        match self {
            StepRejection::AddressRequired => "Please select a delivery address to continue",
            StepRejection::AlreadyAtFinalStep => "Already at the payment step",
        }
    }
}

/// Steps past `address` require a resolvable address
fn gate(target: CheckoutStep, guards: StepGuards) -> Result<CheckoutStep, StepRejection> {
    if target > CheckoutStep::Address && !guards.address_resolvable {
        return Err(StepRejection::AddressRequired);
    }
    Ok(target)
}

pub fn transition(
    current: CheckoutStep,
    event: StepEvent,
    guards: StepGuards,
) -> Result<CheckoutStep, StepRejection> {
    match event {
        StepEvent::Advance => {
            let target = current.next().ok_or(StepRejection::AlreadyAtFinalStep)?;
            gate(target, guards)
        }
        StepEvent::Retreat => Ok(current.previous().unwrap_or(CheckoutStep::Address)),
        StepEvent::Enter(target) => gate(target, guards),
    }
}
