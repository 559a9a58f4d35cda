//! vigil-probes — concrete observers beyond pool health.
//!
//! - [`balance::BalanceProbe`]: pull probe comparing account balances
//!   against configured minimums, alerting when an account newly drops
//!   below its floor.
//! - [`compliance::ComplianceProbe`]: push-only probe folding validated
//!   KYC webhook payloads into its cached state.

pub mod balance;
pub mod compliance;

pub use balance::{AccountBalance, BalanceLimit, BalanceProbe, BalanceSource};
pub use compliance::{ComplianceProbe, KycRecord, KycStatus};
