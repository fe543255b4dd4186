//! Blockchain Service
//!
//! Handles blockchain network interactions.
//!
//! 4개 컨트랙트(RealEstateNFT, FractionalOwnership, PropertyValuation,
//! IncomeDistribution)를 서명 지갑으로 호출한다. 모든 상태 변경 호출은
//! estimate-gas → send → N confirmation 대기 → 이벤트 파싱 순서이고,
//! 설정의 재시도 정책(지수 백오프 + 호출당 타임아웃)을 소비한다.
//!
//! 설정이 없으면 비활성 상태로 기동: 체인 기록이 필수인 핸들러가
//! `is_configured()`로 먼저 거른다.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use ethers::abi::{parse_abi, Abi, RawLog};
use ethers::contract::{Contract, ContractCall, EthEvent, EthLogDecode};
use ethers::core::types::{Address, TransactionReceipt, U256, U64};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};

use crate::config::ChainSettings;
use crate::types::Wei;

pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

type Call = ContractCall<SignerClient, ()>;

// ============ 호출 결과 타입 ============

/// 체인 호출 영수증 요약
#[derive(Debug, Clone)]
pub struct ChainReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MintedProperty {
    pub onchain_token_id: i64,
    pub receipt: ChainReceipt,
}

#[derive(Debug, Clone)]
pub struct RecordedValuation {
    pub onchain_valuation_id: i64,
    pub receipt: ChainReceipt,
}

#[derive(Debug, Clone)]
pub struct RegisteredDistribution {
    pub onchain_distribution_id: i64,
    pub receipt: ChainReceipt,
}

// ============ 컨트랙트 이벤트 ============

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "PropertyMinted")]
struct PropertyMinted {
    #[ethevent(indexed)]
    token_id: U256,
    #[ethevent(indexed)]
    to: Address,
    uri: String,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "ValuationRecorded")]
struct ValuationRecorded {
    #[ethevent(indexed)]
    valuation_id: U256,
    #[ethevent(indexed)]
    token_id: U256,
    value: U256,
}

#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "DistributionRegistered")]
struct DistributionRegistered {
    #[ethevent(indexed)]
    distribution_id: U256,
    #[ethevent(indexed)]
    token_id: U256,
    total_amount: U256,
}

// ============ 재시도 정책 ============

/// 체인 호출 재시도 정책 (설정에서 소비)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub call_timeout_ms: u64,
}

/// n번째 재시도 전 대기 시간: base * 2^(n-1)
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(1u64 << shift))
}

// ============ 서비스 ============

struct ChainInner {
    #[allow(dead_code)]
    client: Arc<SignerClient>,
    /// 서명 지갑 주소: 플랫폼 보관 지분의 출발 주소
    treasury: Address,
    nft: Contract<SignerClient>,
    fractional: Contract<SignerClient>,
    valuation: Contract<SignerClient>,
    distribution: Contract<SignerClient>,
    gas_limit: U256,
    gas_price: Option<U256>,
    confirmations: usize,
    retry: RetryPolicy,
}

pub struct BlockchainService {
    inner: Option<ChainInner>,
}

impl BlockchainService {
    /// 설정에서 생성: 체인 설정이 없으면 비활성 게이트웨이
    pub fn from_settings(settings: Option<&ChainSettings>) -> Result<Self> {
        let settings = match settings {
            Some(s) => s,
            None => return Ok(Self { inner: None }),
        };

        let provider = Provider::<Http>::try_from(settings.rpc_url.as_str())
            .context("invalid ETH_RPC_URL")?;
        let wallet = settings
            .signer_key
            .parse::<LocalWallet>()
            .context("invalid SIGNER_PRIVATE_KEY")?
            .with_chain_id(settings.chain_id);
        let treasury = wallet.address();
        let client = Arc::new(SignerMiddleware::new(provider, wallet));

        let nft = Self::contract(&settings.nft_address, nft_abi()?, &client)?;
        let fractional =
            Self::contract(&settings.fractional_address, fractional_abi()?, &client)?;
        let valuation = Self::contract(&settings.valuation_address, valuation_abi()?, &client)?;
        let distribution =
            Self::contract(&settings.distribution_address, distribution_abi()?, &client)?;

        Ok(Self {
            inner: Some(ChainInner {
                client,
                treasury,
                nft,
                fractional,
                valuation,
                distribution,
                gas_limit: U256::from(settings.gas_limit),
                gas_price: settings
                    .gas_price_gwei
                    .map(|gwei| U256::from(gwei) * U256::exp10(9)),
                confirmations: settings.confirmations,
                retry: RetryPolicy {
                    max_retries: settings.max_retries,
                    retry_base_ms: settings.retry_base_ms,
                    call_timeout_ms: settings.call_timeout_ms,
                },
            }),
        })
    }

    /// 비활성 게이트웨이 (개발/테스트용)
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    /// 서명 지갑(트레저리) 주소
    pub fn treasury_address(&self) -> Option<String> {
        self.inner
            .as_ref()
            .map(|i| format!("{:?}", i.treasury))
    }

    /// RealEstateNFT 컨트랙트 주소
    pub fn nft_contract_address(&self) -> Option<String> {
        self.inner
            .as_ref()
            .map(|i| format!("{:?}", i.nft.address()))
    }

    fn contract(
        address: &str,
        abi: Abi,
        client: &Arc<SignerClient>,
    ) -> Result<Contract<SignerClient>> {
        let address: Address = address
            .parse()
            .with_context(|| format!("invalid contract address: {}", address))?;
        Ok(Contract::new(address, abi, Arc::clone(client)))
    }

    fn inner(&self) -> Result<&ChainInner> {
        self.inner
            .as_ref()
            .ok_or_else(|| anyhow!("chain gateway not configured"))
    }

    // ============ 컨트랙트 호출 ============

    /// 부동산 NFT 민팅
    pub async fn mint_property(
        &self,
        owner_wallet: Option<&str>,
        metadata_uri: &str,
    ) -> Result<MintedProperty> {
        let inner = self.inner()?;
        let to: Address = match owner_wallet {
            Some(addr) => addr.parse().context("invalid owner wallet address")?,
            None => inner.treasury,
        };

        let call: Call = inner
            .nft
            .method("mintProperty", (to, metadata_uri.to_string()))
            .context("mintProperty encode failed")?;
        let receipt = self.send_with_retry(inner, call, "mintProperty").await?;

        let event: PropertyMinted = find_event(&receipt)
            .ok_or_else(|| anyhow!("PropertyMinted event not found in receipt"))?;

        Ok(MintedProperty {
            onchain_token_id: event.token_id.as_u64() as i64,
            receipt: receipt_info(&receipt),
        })
    }

    /// 지분 발행 (토큰화 시 1회)
    pub async fn issue_shares(
        &self,
        onchain_token_id: i64,
        total_shares: i64,
        price_per_share: Wei,
    ) -> Result<ChainReceipt> {
        let inner = self.inner()?;
        let call: Call = inner
            .fractional
            .method(
                "issueShares",
                (
                    U256::from(onchain_token_id as u64),
                    U256::from(total_shares as u64),
                    U256::from(price_per_share.value()),
                ),
            )
            .context("issueShares encode failed")?;
        let receipt = self.send_with_retry(inner, call, "issueShares").await?;
        Ok(receipt_info(&receipt))
    }

    /// 지분 이전
    pub async fn transfer_shares(
        &self,
        onchain_token_id: i64,
        from: Option<&str>,
        to: &str,
        quantity: i64,
    ) -> Result<ChainReceipt> {
        let inner = self.inner()?;
        let from: Address = match from {
            Some(addr) => addr.parse().context("invalid sender address")?,
            None => inner.treasury,
        };
        let to: Address = to.parse().context("invalid receiver address")?;

        let call: Call = inner
            .fractional
            .method(
                "transferShares",
                (
                    U256::from(onchain_token_id as u64),
                    from,
                    to,
                    U256::from(quantity as u64),
                ),
            )
            .context("transferShares encode failed")?;
        let receipt = self.send_with_retry(inner, call, "transferShares").await?;
        Ok(receipt_info(&receipt))
    }

    /// 감정평가 기록
    pub async fn record_valuation(
        &self,
        onchain_token_id: i64,
        value: Wei,
    ) -> Result<RecordedValuation> {
        let inner = self.inner()?;
        let call: Call = inner
            .valuation
            .method(
                "recordValuation",
                (
                    U256::from(onchain_token_id as u64),
                    U256::from(value.value()),
                ),
            )
            .context("recordValuation encode failed")?;
        let receipt = self.send_with_retry(inner, call, "recordValuation").await?;

        let event: ValuationRecorded = find_event(&receipt)
            .ok_or_else(|| anyhow!("ValuationRecorded event not found in receipt"))?;

        Ok(RecordedValuation {
            onchain_valuation_id: event.valuation_id.as_u64() as i64,
            receipt: receipt_info(&receipt),
        })
    }

    /// 수익 분배 등록
    pub async fn register_distribution(
        &self,
        onchain_token_id: i64,
        total_amount: Wei,
    ) -> Result<RegisteredDistribution> {
        let inner = self.inner()?;
        let call: Call = inner
            .distribution
            .method(
                "registerDistribution",
                (
                    U256::from(onchain_token_id as u64),
                    U256::from(total_amount.value()),
                ),
            )
            .context("registerDistribution encode failed")?;
        let receipt = self
            .send_with_retry(inner, call, "registerDistribution")
            .await?;

        let event: DistributionRegistered = find_event(&receipt)
            .ok_or_else(|| anyhow!("DistributionRegistered event not found in receipt"))?;

        Ok(RegisteredDistribution {
            onchain_distribution_id: event.distribution_id.as_u64() as i64,
            receipt: receipt_info(&receipt),
        })
    }

    /// 분배 자금 예치 (payable)
    pub async fn deposit_distribution_funds(
        &self,
        onchain_distribution_id: i64,
        amount: Wei,
    ) -> Result<ChainReceipt> {
        let inner = self.inner()?;
        let call: Call = inner
            .distribution
            .method("deposit", U256::from(onchain_distribution_id as u64))
            .context("deposit encode failed")?;
        let call = call.value(U256::from(amount.value()));
        let receipt = self.send_with_retry(inner, call, "deposit").await?;
        Ok(receipt_info(&receipt))
    }

    /// 분배 실행
    pub async fn execute_distribution(
        &self,
        onchain_distribution_id: i64,
    ) -> Result<ChainReceipt> {
        let inner = self.inner()?;
        let call: Call = inner
            .distribution
            .method(
                "executeDistribution",
                U256::from(onchain_distribution_id as u64),
            )
            .context("executeDistribution encode failed")?;
        let receipt = self
            .send_with_retry(inner, call, "executeDistribution")
            .await?;
        Ok(receipt_info(&receipt))
    }

    /// 분배 취소
    pub async fn cancel_distribution(
        &self,
        onchain_distribution_id: i64,
    ) -> Result<ChainReceipt> {
        let inner = self.inner()?;
        let call: Call = inner
            .distribution
            .method(
                "cancelDistribution",
                U256::from(onchain_distribution_id as u64),
            )
            .context("cancelDistribution encode failed")?;
        let receipt = self
            .send_with_retry(inner, call, "cancelDistribution")
            .await?;
        Ok(receipt_info(&receipt))
    }

    // ============ 전송 공통 경로 ============

    /// 재시도 + 타임아웃을 걸고 전송
    async fn send_with_retry(
        &self,
        inner: &ChainInner,
        call: Call,
        label: &str,
    ) -> Result<TransactionReceipt> {
        let timeout = Duration::from_millis(inner.retry.call_timeout_ms);
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 0..=inner.retry.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(inner.retry.retry_base_ms, attempt);
                tracing::warn!(
                    "{}: retry {}/{} after {:?}",
                    label,
                    attempt,
                    inner.retry.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(timeout, self.try_send(inner, call.clone())).await {
                Ok(Ok(receipt)) => {
                    tracing::info!(
                        "{} confirmed: {:?}",
                        label,
                        receipt.transaction_hash
                    );
                    return Ok(receipt);
                }
                Ok(Err(e)) => {
                    tracing::warn!("{} failed: {:#}", label, e);
                    last_err = Some(e);
                }
                Err(_) => {
                    tracing::warn!("{} timed out after {:?}", label, timeout);
                    last_err = Some(anyhow!("call timed out after {:?}", timeout));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("{} failed", label)))
    }

    /// estimate-gas → send → confirmation 대기 (1회 시도)
    async fn try_send(&self, inner: &ChainInner, call: Call) -> Result<TransactionReceipt> {
        let estimate = call.estimate_gas().await.context("gas estimation failed")?;
        // 추정치 + 20% 여유, 설정 상한으로 캡
        let padded = estimate.saturating_mul(U256::from(12)) / U256::from(10);
        let mut call = call.gas(padded.min(inner.gas_limit));
        if let Some(price) = inner.gas_price {
            call = call.gas_price(price);
        }

        let pending = call.send().await.context("transaction send failed")?;
        let receipt = pending
            .confirmations(inner.confirmations)
            .await
            .context("waiting for receipt failed")?
            .ok_or_else(|| anyhow!("transaction dropped from mempool"))?;

        if receipt.status != Some(U64::from(1)) {
            bail!("transaction reverted: {:?}", receipt.transaction_hash);
        }
        Ok(receipt)
    }
}

fn receipt_info(receipt: &TransactionReceipt) -> ChainReceipt {
    ChainReceipt {
        tx_hash: format!("{:?}", receipt.transaction_hash),
        block_number: receipt.block_number.map(|b| b.as_u64()),
        gas_used: receipt.gas_used.map(|g| g.as_u64()),
    }
}

/// 영수증 로그에서 첫 번째로 디코딩되는 이벤트를 찾는다
fn find_event<T: EthLogDecode>(receipt: &TransactionReceipt) -> Option<T> {
    receipt.logs.iter().find_map(|log| {
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        T::decode_log(&raw).ok()
    })
}

// ============ ABI ============

fn nft_abi() -> Result<Abi> {
    parse_abi(&[
        "function mintProperty(address to, string uri) returns (uint256)",
        "event PropertyMinted(uint256 indexed tokenId, address indexed to, string uri)",
    ])
    .context("RealEstateNFT ABI parse failed")
}

fn fractional_abi() -> Result<Abi> {
    parse_abi(&[
        "function issueShares(uint256 tokenId, uint256 totalShares, uint256 pricePerShare)",
        "function transferShares(uint256 tokenId, address from, address to, uint256 amount)",
        "event SharesIssued(uint256 indexed tokenId, uint256 totalShares)",
    ])
    .context("FractionalOwnership ABI parse failed")
}

fn valuation_abi() -> Result<Abi> {
    parse_abi(&[
        "function recordValuation(uint256 tokenId, uint256 value) returns (uint256)",
        "event ValuationRecorded(uint256 indexed valuationId, uint256 indexed tokenId, uint256 value)",
    ])
    .context("PropertyValuation ABI parse failed")
}

fn distribution_abi() -> Result<Abi> {
    parse_abi(&[
        "function registerDistribution(uint256 tokenId, uint256 totalAmount) returns (uint256)",
        "function deposit(uint256 distributionId) payable",
        "function executeDistribution(uint256 distributionId)",
        "function cancelDistribution(uint256 distributionId)",
        "event DistributionRegistered(uint256 indexed distributionId, uint256 indexed tokenId, uint256 totalAmount)",
    ])
    .context("IncomeDistribution ABI parse failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_doubles() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 2), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(2_000));
    }

    #[test]
    fn test_disabled_gateway() {
        let service = BlockchainService::disabled();
        assert!(!service.is_configured());
        assert!(service.treasury_address().is_none());
    }

    #[test]
    fn test_from_settings_none_is_disabled() {
        let service = BlockchainService::from_settings(None).unwrap();
        assert!(!service.is_configured());
    }

    #[test]
    fn test_from_settings_builds_contracts() {
        // anvil 기본 계정 #0 키: 네트워크 접속 없이 지갑/컨트랙트 구성만 확인
        let settings = ChainSettings {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 31337,
            signer_key: "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                .to_string(),
            nft_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
            fractional_address: "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512".to_string(),
            valuation_address: "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0".to_string(),
            distribution_address: "0xCf7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9".to_string(),
            gas_limit: 3_000_000,
            gas_price_gwei: Some(20),
            confirmations: 1,
            max_retries: 3,
            retry_base_ms: 500,
            call_timeout_ms: 30_000,
        };

        let service = BlockchainService::from_settings(Some(&settings)).unwrap();
        assert!(service.is_configured());
        assert!(service
            .treasury_address()
            .unwrap()
            .starts_with("0x"));
    }

    #[test]
    fn test_abis_parse() {
        assert!(nft_abi().is_ok());
        assert!(fractional_abi().is_ok());
        assert!(valuation_abi().is_ok());
        assert!(distribution_abi().is_ok());
    }

    #[test]
    fn test_receipt_info_formats_hash() {
        let receipt = TransactionReceipt::default();
        let info = receipt_info(&receipt);
        assert!(info.tx_hash.starts_with("0x"));
        assert_eq!(info.block_number, None);
    }
}
