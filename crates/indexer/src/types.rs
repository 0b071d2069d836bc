//! Indexer wire records and their conversion into the deposit model.

use crate::IndexerError;
use alloy_primitives::{Address, B256, U256};
use deposit::{
    Deposit, DepositKey, DepositStatus, FeePct, IndexerObservation, Limits, FIXED_POINT_SCALE,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// How to look a deposit up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepositQuery {
    /// `GET /deposit?depositTxHash=`
    TxHash(B256),
    /// `GET /deposit/status?originChainId=&depositId=`
    Key(DepositKey),
}

impl DepositQuery {
    pub const fn key(&self) -> Option<DepositKey> {
        match self {
            Self::TxHash(_) => None,
            Self::Key(key) => Some(*key),
        }
    }
}

/// The indexer serves integers either as JSON numbers or decimal strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(u64),
    Text(String),
}

fn de_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<Numeric>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Numeric::Number(n)) => Ok(Some(n)),
        Some(Numeric::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn de_opt_u256<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
    match Option::<Numeric>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Numeric::Number(n)) => Ok(Some(U256::from(n))),
        Some(Numeric::Text(s)) => U256::from_str(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

fn parse_amount(field: &str, value: &str) -> Result<U256, IndexerError> {
    U256::from_str(value).map_err(|e| IndexerError::Decode(format!("{field}: {e}")))
}

/// Deposit record as served by `/deposit` and `/deposit/status`.
///
/// Timestamps are unix seconds. Everything but `status` is optional because the
/// status endpoint returns a reduced record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    pub status: String,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub origin_chain_id: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub destination_chain_id: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u256")]
    pub deposit_id: Option<U256>,
    #[serde(default)]
    pub depositor: Option<Address>,
    #[serde(default)]
    pub recipient: Option<Address>,
    #[serde(default)]
    pub input_token: Option<Address>,
    #[serde(default)]
    pub output_token: Option<Address>,
    #[serde(default, deserialize_with = "de_opt_u256")]
    pub input_amount: Option<U256>,
    #[serde(default, deserialize_with = "de_opt_u256")]
    pub output_amount: Option<U256>,
    #[serde(default)]
    pub deposit_tx_hash: Option<B256>,
    #[serde(default, alias = "fillTxHash")]
    pub fill_tx: Option<B256>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub deposit_block_timestamp: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub fill_block_timestamp: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub fill_deadline: Option<u64>,
    #[serde(default)]
    pub bridge_fee_usd: Option<String>,
}

impl DepositRecord {
    pub fn status(&self) -> DepositStatus {
        DepositStatus::from_indexer(&self.status)
    }

    pub fn key(&self) -> Option<DepositKey> {
        Some(DepositKey::new(self.origin_chain_id?, self.deposit_id?))
    }

    pub fn observation(&self) -> IndexerObservation {
        IndexerObservation {
            status: Some(self.status()),
            deposit_block_timestamp: self.deposit_block_timestamp,
            fill_block_timestamp: self.fill_block_timestamp,
            bridge_fee_usd: self.bridge_fee_usd.clone(),
            fill_tx_hash: self.fill_tx,
        }
    }

    /// A deposit seeded from this record, when it carries the route and amounts.
    pub fn to_deposit(&self) -> Option<Deposit> {
        let input_amount = self.input_amount?;
        let output_amount = self.output_amount?;
        let status = self.status();

        Some(Deposit {
            key: self.key()?,
            destination_chain_id: self.destination_chain_id?,
            depositor: self.depositor.unwrap_or_default(),
            recipient: self.recipient.unwrap_or_default(),
            input_token: self.input_token?,
            output_token: self.output_token.unwrap_or_default(),
            input_amount,
            output_amount,
            deposit_timestamp: self.deposit_block_timestamp.unwrap_or_default(),
            fill_deadline: self.fill_deadline.unwrap_or_default(),
            deposit_tx_hash: self.deposit_tx_hash,
            quoted_relayer_fee_pct: FeePct::from_amounts(input_amount, output_amount),
            suggested_relayer_fee_pct: None,
            status,
            fill_tx_hash: self.fill_tx.filter(|_| status == DepositStatus::Filled),
            fill_timestamp: self
                .fill_block_timestamp
                .filter(|_| status == DepositStatus::Filled),
        })
    }
}

/// `/deposit` wraps the record; some deployments return it bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum DepositResponse {
    Wrapped { deposit: DepositRecord },
    Bare(DepositRecord),
}

impl DepositResponse {
    pub(crate) fn into_record(self) -> DepositRecord {
        match self {
            Self::Wrapped { deposit } | Self::Bare(deposit) => deposit,
        }
    }
}

/// `/limits` response. Amounts are decimal strings in the token's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsResponse {
    pub min_deposit: String,
    pub max_deposit: String,
    pub max_deposit_instant: String,
    pub max_deposit_short_delay: String,
}

impl TryFrom<LimitsResponse> for Limits {
    type Error = IndexerError;

    fn try_from(wire: LimitsResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            min_deposit: parse_amount("minDeposit", &wire.min_deposit)?,
            max_deposit: parse_amount("maxDeposit", &wire.max_deposit)?,
            max_deposit_instant: parse_amount("maxDepositInstant", &wire.max_deposit_instant)?,
            max_deposit_short_delay: parse_amount(
                "maxDepositShortDelay",
                &wire.max_deposit_short_delay,
            )?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayFee {
    /// 1e18 fixed point
    pub pct: String,
    #[serde(default)]
    pub total: Option<String>,
}

/// `/suggested-fees` response; only the total relay fee is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedFeesResponse {
    pub total_relay_fee: RelayFee,
}

impl TryFrom<SuggestedFeesResponse> for FeePct {
    type Error = IndexerError;

    fn try_from(wire: SuggestedFeesResponse) -> Result<Self, Self::Error> {
        let pct = parse_amount("totalRelayFee.pct", &wire.total_relay_fee.pct)?;
        if pct > FIXED_POINT_SCALE {
            return Err(IndexerError::Decode(format!(
                "totalRelayFee.pct {pct} exceeds 100%"
            )));
        }
        Ok(Self::new(pct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_record_seeds_deposit() {
        let body = json!({
            "deposit": {
                "status": "filled",
                "originChainId": 1,
                "destinationChainId": "130",
                "depositId": "42",
                "inputToken": "0x0404040404040404040404040404040404040404",
                "outputToken": "0x0505050505050505050505050505050505050505",
                "inputAmount": "1000000",
                "outputAmount": "990000",
                "fillTx": format!("{}", B256::repeat_byte(0xf1)),
                "depositBlockTimestamp": 1000,
                "fillBlockTimestamp": "1060",
                "fillDeadline": 22600,
                "bridgeFeeUsd": "0.42"
            }
        });

        let record = serde_json::from_value::<DepositResponse>(body)
            .unwrap()
            .into_record();
        assert_eq!(record.key(), Some(DepositKey::new(1, U256::from(42))));

        let deposit = record.to_deposit().unwrap();
        assert_eq!(deposit.status, DepositStatus::Filled);
        assert_eq!(deposit.destination_chain_id, 130);
        assert_eq!(deposit.fill_timestamp, Some(1060));
        assert_eq!(deposit.fill_tx_hash, Some(B256::repeat_byte(0xf1)));

        let observation = record.observation();
        assert_eq!(observation.bridge_fee_usd.as_deref(), Some("0.42"));
        assert_eq!(observation.deposit_block_timestamp, Some(1000));
    }

    #[test]
    fn test_status_record_normalizes_unfilled() {
        let body = json!({ "status": "unfilled", "fillTx": null });
        let record = serde_json::from_value::<DepositResponse>(body)
            .unwrap()
            .into_record();

        assert_eq!(record.observation().status, Some(DepositStatus::Pending));
        assert_eq!(record.key(), None);
        assert_eq!(record.to_deposit(), None);
    }

    #[test]
    fn test_limits_from_decimal_strings() {
        let wire: LimitsResponse = serde_json::from_value(json!({
            "minDeposit": "100",
            "maxDeposit": "1000000",
            "maxDepositInstant": "50000",
            "maxDepositShortDelay": "500",
        }))
        .unwrap();

        let limits = Limits::try_from(wire.clone()).unwrap();
        assert_eq!(limits.max_deposit_short_delay, U256::from(500));

        let bad = LimitsResponse {
            max_deposit: "lots".into(),
            ..wire
        };
        assert!(matches!(Limits::try_from(bad), Err(IndexerError::Decode(_))));
    }

    #[test]
    fn test_suggested_fee_pct() {
        let wire: SuggestedFeesResponse = serde_json::from_value(json!({
            "totalRelayFee": { "pct": "1000000000000000", "total": "1000" },
            "lpFee": { "pct": "0" }
        }))
        .unwrap();

        let fee = FeePct::try_from(wire).unwrap();
        assert_eq!(fee.raw(), U256::from(1_000_000_000_000_000u64));
    }
}
