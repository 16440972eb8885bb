//! Signed authorization handshake for user decryption
//!
//! Flow per decryption attempt:
//! ```text
//! fresh keypair ─┐
//! start = now ───┼─▶ typed data (EIP-712) ─▶ Signer ─▶ AuthorizationToken ─▶ relayer
//! scope, days ───┘
//! ```
//!
//! Tokens are never cached or reused across attempts. A token is consumed by
//! the decrypt call it was built for.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use shroud_core::config::{AuthorizationConfig, BackendConfig};
use shroud_core::hex::{from_prefixed_hex, to_prefixed_hex};
use shroud_core::{Address, ShroudError, ShroudResult};

use crate::keypair::DecryptionKeypair;
use crate::signer::Signer;

const SECONDS_PER_DAY: u64 = 86_400;

/// Name of the signed struct in the typed-data `types` table
pub const PRIMARY_TYPE: &str = "UserDecryptRequestVerification";

/// Typed-data domain the signature is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedDataField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TypedDataField {
    fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// The message a requester signs to authorize decryption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptRequestVerification {
    pub public_key: String,
    pub contract_addresses: Vec<Address>,
    /// Unix seconds, decimal
    pub start_timestamp: String,
    /// Decimal day count
    pub duration_days: String,
    pub extra_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    pub domain: TypedDataDomain,
    pub types: BTreeMap<String, Vec<TypedDataField>>,
    pub primary_type: String,
    pub message: UserDecryptRequestVerification,
}

impl TypedData {
    pub fn to_json(&self) -> ShroudResult<String> {
        serde_json::to_string(self).map_err(|e| ShroudError::Other(e.into()))
    }
}

/// Build the typed data for a decryption request.
pub fn typed_data(
    domain: &TypedDataDomain,
    public_key_hex: &str,
    contracts: &[Address],
    start_timestamp: &str,
    duration_days: &str,
) -> TypedData {
    let mut types = BTreeMap::new();
    types.insert(
        "EIP712Domain".to_string(),
        vec![
            TypedDataField::new("name", "string"),
            TypedDataField::new("version", "string"),
            TypedDataField::new("chainId", "uint256"),
            TypedDataField::new("verifyingContract", "address"),
        ],
    );
    types.insert(
        PRIMARY_TYPE.to_string(),
        vec![
            TypedDataField::new("publicKey", "bytes"),
            TypedDataField::new("contractAddresses", "address[]"),
            TypedDataField::new("startTimestamp", "uint256"),
            TypedDataField::new("durationDays", "uint256"),
            TypedDataField::new("extraData", "bytes"),
        ],
    );

    TypedData {
        domain: domain.clone(),
        types,
        primary_type: PRIMARY_TYPE.to_string(),
        message: UserDecryptRequestVerification {
            public_key: public_key_hex.to_string(),
            contract_addresses: contracts.to_vec(),
            start_timestamp: start_timestamp.to_string(),
            duration_days: duration_days.to_string(),
            extra_data: "0x00".to_string(),
        },
    }
}

/// Where the handshake gets its keypair and typed data from.
///
/// Encryption backends that ship their own key generation or typed-data
/// layout override these; the defaults are local.
pub trait KeySource: Send + Sync {
    fn generate_keypair(&self) -> ShroudResult<DecryptionKeypair> {
        DecryptionKeypair::generate()
    }

    fn create_eip712(
        &self,
        domain: &TypedDataDomain,
        public_key_hex: &str,
        contracts: &[Address],
        start_timestamp: &str,
        duration_days: &str,
    ) -> TypedData {
        typed_data(domain, public_key_hex, contracts, start_timestamp, duration_days)
    }
}

/// Key source that always uses the local defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalKeys;

impl KeySource for LocalKeys {}

/// How long a token stays valid and which domain it is signed under
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    pub duration_days: u32,
    pub domain: TypedDataDomain,
}

impl AuthorizationPolicy {
    pub fn from_config(auth: &AuthorizationConfig, backend: &BackendConfig) -> Self {
        Self {
            duration_days: auth.duration_days,
            domain: TypedDataDomain {
                name: auth.domain_name.clone(),
                version: auth.domain_version.clone(),
                chain_id: backend.chain_id,
                verifying_contract: auth.verifying_contract,
            },
        }
    }
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self::from_config(&AuthorizationConfig::default(), &BackendConfig::default())
    }
}

/// An unsigned authorization: everything except the signature.
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub keypair: DecryptionKeypair,
    pub start_timestamp: String,
    pub duration_days: String,
    pub scope: Vec<Address>,
    pub typed_data: TypedData,
}

/// Raw signature bytes as returned by the wallet
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> ShroudResult<Self> {
        from_prefixed_hex(s)
            .map(Self)
            .map_err(|e| ShroudError::SignerUnavailable(format!("signer returned invalid hex: {e}")))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        to_prefixed_hex(&self.0)
    }

    /// Relayer form: hex without the `0x` prefix.
    pub fn to_hex_unprefixed(&self) -> String {
        hex::encode(&self.0)
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// A signed, single-use decryption authorization.
///
/// Not `Clone`: each token backs exactly one decrypt call.
#[derive(Debug)]
pub struct AuthorizationToken {
    pub keypair: DecryptionKeypair,
    pub signature: Signature,
    pub signer: Address,
    pub start_timestamp: String,
    pub duration_days: String,
    pub scope: Vec<Address>,
}

impl AuthorizationToken {
    /// Unix second at which the relayer stops honoring this token.
    pub fn expires_at(&self) -> ShroudResult<u64> {
        let start = parse_decimal(&self.start_timestamp, "start timestamp")?;
        let days = parse_decimal(&self.duration_days, "duration")?;
        Ok(start.saturating_add(days.saturating_mul(SECONDS_PER_DAY)))
    }
}

fn parse_decimal(s: &str, what: &str) -> ShroudResult<u64> {
    s.parse()
        .map_err(|_| ShroudError::Other(anyhow::anyhow!("token {what} is not decimal: {s}")))
}

/// Current Unix time in whole seconds.
pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Build an unsigned authorization starting now.
pub fn build_token<K>(
    keys: &K,
    scope: &[Address],
    policy: &AuthorizationPolicy,
) -> ShroudResult<AuthorizationRequest>
where
    K: KeySource + ?Sized,
{
    build_token_at(keys, scope, policy, now_unix_secs())
}

/// Build an unsigned authorization with an explicit start time.
pub fn build_token_at<K>(
    keys: &K,
    scope: &[Address],
    policy: &AuthorizationPolicy,
    start_unix_secs: u64,
) -> ShroudResult<AuthorizationRequest>
where
    K: KeySource + ?Sized,
{
    let keypair = keys.generate_keypair()?;
    let start_timestamp = start_unix_secs.to_string();
    let duration_days = policy.duration_days.to_string();
    let typed_data = keys.create_eip712(
        &policy.domain,
        &keypair.public_key_hex(),
        scope,
        &start_timestamp,
        &duration_days,
    );

    tracing::debug!(
        start = %start_timestamp,
        days = %duration_days,
        contracts = scope.len(),
        "built decryption authorization"
    );

    Ok(AuthorizationRequest {
        keypair,
        start_timestamp,
        duration_days,
        scope: scope.to_vec(),
        typed_data,
    })
}

/// Have the requester's wallet sign the request.
///
/// `SignerUnavailable` and `UserRejectedSignature` pass through unchanged.
pub async fn sign(request: AuthorizationRequest, signer: &dyn Signer) -> ShroudResult<AuthorizationToken> {
    let address = signer.address().await?;
    let signature = signer.sign_typed_data(&request.typed_data).await?;
    tracing::debug!(signer = %address, "decryption authorization signed");

    Ok(AuthorizationToken {
        keypair: request.keypair,
        signature,
        signer: address,
        start_timestamp: request.start_timestamp,
        duration_days: request.duration_days,
        scope: request.scope,
    })
}
