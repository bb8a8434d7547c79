use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CREDITS_DECIMALS: u32 = 6;
pub const CREDITS_BASE_UNIT: u64 = 1_000_000; // 10^6

/// Fixed-point monetary amount in base units (10^-6 credits).
///
/// All balance arithmetic goes through checked operations; overflow is an
/// error, never a wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Credits(u64);

impl Credits {
    pub const ZERO: Self = Self(0);

    pub fn from_credits(credits: f64) -> Self {
        Self((credits * CREDITS_BASE_UNIT as f64) as u64)
    }

    pub fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub fn to_credits(&self) -> f64 {
        self.0 as f64 / CREDITS_BASE_UNIT as f64
    }

    pub fn to_base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn checked_mul_u32(&self, count: u32) -> Option<Self> {
        self.0.checked_mul(count as u64).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Scale by basis points (1 bps = 0.01%), rounding down.
    ///
    /// Used for the payout split; the intermediate product is computed in
    /// u128 so no representable amount can overflow.
    pub fn mul_bps(&self, bps: u16) -> Self {
        Self(((self.0 as u128 * bps as u128) / 10_000) as u64)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} CR", self.to_credits())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId([u8; 32]);

impl AccountId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Account receiving the platform's share of every payout.
    pub fn platform_treasury() -> Self {
        Self([0xFF; 32])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

/// Persistent state of one account.
///
/// `balance` and `assigned_balance` are disjoint: reserving escrow moves
/// funds out of `balance` into `assigned_balance`, releasing moves them
/// back. Accounts are never deleted; `disabled` soft-disables new activity
/// while retaining ledger history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    pub balance: Credits,
    pub assigned_balance: Credits,
    pub total_earnings: Credits,
    pub in_progress_count: u32,
    pub completed_count: u32,
    pub disabled: bool,
}

impl AccountRecord {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            balance: Credits::ZERO,
            assigned_balance: Credits::ZERO,
            total_earnings: Credits::ZERO,
            in_progress_count: 0,
            completed_count: 0,
            disabled: false,
        }
    }
}

/// Why a transfer happened, recorded with every completed fund movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferReason {
    DepositApproved,
    WithdrawalHold,
    WithdrawalRefund,
    EscrowReserve,
    EscrowRelease,
    PayoutEarnings,
    PlatformFee,
}

impl fmt::Display for TransferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferReason::DepositApproved => "deposit_approved",
            TransferReason::WithdrawalHold => "withdrawal_hold",
            TransferReason::WithdrawalRefund => "withdrawal_refund",
            TransferReason::EscrowReserve => "escrow_reserve",
            TransferReason::EscrowRelease => "escrow_release",
            TransferReason::PayoutEarnings => "payout_earnings",
            TransferReason::PlatformFee => "platform_fee",
        };
        write!(f, "{}", s)
    }
}

/// Append-only record of one completed fund movement.
///
/// Escrow reserve/release movements stay within one account, so `from`
/// and `to` are equal there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Credits,
    pub reason: TransferReason,
    pub timestamp: DateTime<Utc>,
    pub transfer_hash: String,
}

impl TransferRecord {
    pub fn new(from: AccountId, to: AccountId, amount: Credits, reason: TransferReason) -> Self {
        let timestamp = Utc::now();

        let mut hasher = blake3::Hasher::new();
        hasher.update(from.as_bytes());
        hasher.update(to.as_bytes());
        hasher.update(&amount.to_base_units().to_le_bytes());
        hasher.update(&timestamp.timestamp_micros().to_le_bytes());
        let transfer_hash = hex::encode(hasher.finalize().as_bytes());

        Self {
            from,
            to,
            amount,
            reason,
            timestamp,
            transfer_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credits_conversion() {
        let amount = Credits::from_credits(12.5);
        assert_eq!(amount.to_base_units(), 12_500_000);
        assert_eq!(Credits::from_base_units(12_500_000), amount);
    }

    #[test]
    fn test_credits_checked_arithmetic() {
        let a = Credits::from_credits(10.0);
        let b = Credits::from_credits(3.0);

        assert_eq!(a.checked_sub(b), Some(Credits::from_credits(7.0)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(
            Credits::from_base_units(u64::MAX).checked_add(Credits::from_base_units(1)),
            None
        );
    }

    #[test]
    fn test_mul_bps_rounds_down() {
        let price = Credits::from_base_units(10_000_000);
        assert_eq!(price.mul_bps(9_000).to_base_units(), 9_000_000);
        assert_eq!(Credits::from_base_units(3).mul_bps(9_000).to_base_units(), 2);
        assert_eq!(price.mul_bps(10_000), price);
        assert_eq!(price.mul_bps(0), Credits::ZERO);
    }

    #[test]
    fn test_checked_mul_u32() {
        let price = Credits::from_credits(10.0);
        assert_eq!(price.checked_mul_u32(5), Some(Credits::from_credits(50.0)));
        assert_eq!(Credits::from_base_units(u64::MAX).checked_mul_u32(2), None);
    }
}
