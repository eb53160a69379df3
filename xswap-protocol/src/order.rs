//! Cross-chain order: the maker's signed, immutable offer.
//!
//! An `Order` has no setters. Every term, including the destination chain, is
//! fixed through `OrderBuilder` and validated in `build()`. The order hash is
//! recomputed from the fields on every call, so a signature only verifies
//! against the exact terms it was produced for.

use crate::data_structures::{AccountId, AssetId};
use crate::errors::{Result, SwapError};
use crate::htlc::{HashLock, TimeLocks};
use ethers::abi::{encode, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, H256, U256};
use ethers::utils::keccak256;
use rand::Rng;
use serde::{Deserialize, Serialize};

const ORDER_TYPE: &[u8] = b"CrossChainOrder(uint256 salt,address maker,string receiver,uint256 receiverChainId,\
string makerAsset,string takerAsset,uint256 makingAmount,uint256 takingAmount,bytes32 hashlock,\
uint256 timelocks,uint256 srcChainId,uint256 dstChainId,uint256 srcSafetyDeposit,uint256 dstSafetyDeposit,\
uint256 nonce,bool allowPartialFills,bool allowMultipleFills)";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    salt: U256,
    maker: Address,
    receiver: AccountId,
    maker_asset: AssetId,
    taker_asset: AssetId,
    making_amount: u128,
    taking_amount: u128,
    hashlock: HashLock,
    timelocks: TimeLocks,
    src_chain_id: u64,
    dst_chain_id: u64,
    src_safety_deposit: u128,
    dst_safety_deposit: u128,
    nonce: U256,
    allow_partial_fills: bool,
    allow_multiple_fills: bool,
}

impl Order {
    pub fn builder() -> OrderBuilder {
        OrderBuilder::default()
    }

    pub fn salt(&self) -> U256 {
        self.salt
    }

    pub fn maker(&self) -> Address {
        self.maker
    }

    /// Maker's account on the destination chain.
    pub fn receiver(&self) -> &AccountId {
        &self.receiver
    }

    pub fn maker_asset(&self) -> &AssetId {
        &self.maker_asset
    }

    pub fn taker_asset(&self) -> &AssetId {
        &self.taker_asset
    }

    pub fn making_amount(&self) -> u128 {
        self.making_amount
    }

    pub fn taking_amount(&self) -> u128 {
        self.taking_amount
    }

    pub fn hashlock(&self) -> HashLock {
        self.hashlock
    }

    pub fn timelocks(&self) -> TimeLocks {
        self.timelocks
    }

    pub fn src_chain_id(&self) -> u64 {
        self.src_chain_id
    }

    pub fn dst_chain_id(&self) -> u64 {
        self.dst_chain_id
    }

    pub fn src_safety_deposit(&self) -> u128 {
        self.src_safety_deposit
    }

    pub fn dst_safety_deposit(&self) -> u128 {
        self.dst_safety_deposit
    }

    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    pub fn allow_partial_fills(&self) -> bool {
        self.allow_partial_fills
    }

    pub fn allow_multiple_fills(&self) -> bool {
        self.allow_multiple_fills
    }

    /// keccak-256 of the ABI-encoded terms.
    pub fn order_hash(&self) -> H256 {
        let tokens = vec![
            Token::FixedBytes(keccak256(ORDER_TYPE).to_vec()),
            Token::Uint(self.salt),
            Token::Address(self.maker),
            Token::String(self.receiver.address.clone()),
            Token::Uint(U256::from(self.receiver.chain_id)),
            Token::String(self.maker_asset.token_address.clone()),
            Token::String(self.taker_asset.token_address.clone()),
            Token::Uint(U256::from(self.making_amount)),
            Token::Uint(U256::from(self.taking_amount)),
            Token::FixedBytes(self.hashlock.digest().as_bytes().to_vec()),
            Token::Uint(self.timelocks.encode_offsets()),
            Token::Uint(U256::from(self.src_chain_id)),
            Token::Uint(U256::from(self.dst_chain_id)),
            Token::Uint(U256::from(self.src_safety_deposit)),
            Token::Uint(U256::from(self.dst_safety_deposit)),
            Token::Uint(self.nonce),
            Token::Bool(self.allow_partial_fills),
            Token::Bool(self.allow_multiple_fills),
        ];
        H256::from(keccak256(encode(&tokens)))
    }
}

#[derive(Clone, Debug, Default)]
pub struct OrderBuilder {
    salt: Option<U256>,
    maker: Option<Address>,
    receiver: Option<AccountId>,
    maker_asset: Option<AssetId>,
    taker_asset: Option<AssetId>,
    making_amount: Option<u128>,
    taking_amount: Option<u128>,
    hashlock: Option<HashLock>,
    timelocks: Option<TimeLocks>,
    src_chain_id: Option<u64>,
    dst_chain_id: Option<u64>,
    src_safety_deposit: u128,
    dst_safety_deposit: u128,
    nonce: Option<U256>,
    allow_partial_fills: bool,
    allow_multiple_fills: bool,
}

impl OrderBuilder {
    pub fn salt(mut self, salt: U256) -> Self {
        self.salt = Some(salt);
        self
    }

    pub fn maker(mut self, maker: Address) -> Self {
        self.maker = Some(maker);
        self
    }

    pub fn receiver(mut self, receiver: AccountId) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn maker_asset(mut self, asset: AssetId, amount: u128) -> Self {
        self.maker_asset = Some(asset);
        self.making_amount = Some(amount);
        self
    }

    pub fn taker_asset(mut self, asset: AssetId, amount: u128) -> Self {
        self.taker_asset = Some(asset);
        self.taking_amount = Some(amount);
        self
    }

    pub fn hashlock(mut self, hashlock: HashLock) -> Self {
        self.hashlock = Some(hashlock);
        self
    }

    pub fn timelocks(mut self, timelocks: TimeLocks) -> Self {
        self.timelocks = Some(timelocks);
        self
    }

    pub fn source_chain(mut self, chain_id: u64) -> Self {
        self.src_chain_id = Some(chain_id);
        self
    }

    /// Destination chain of the order. Chains outside the order SDK's
    /// registry (e.g. a Starknet devnet) are set here, before signing.
    pub fn destination_chain(mut self, chain_id: u64) -> Self {
        self.dst_chain_id = Some(chain_id);
        self
    }

    pub fn safety_deposits(mut self, src: u128, dst: u128) -> Self {
        self.src_safety_deposit = src;
        self.dst_safety_deposit = dst;
        self
    }

    pub fn nonce(mut self, nonce: U256) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn allow_partial_fills(mut self, allow: bool) -> Self {
        self.allow_partial_fills = allow;
        self
    }

    pub fn allow_multiple_fills(mut self, allow: bool) -> Self {
        self.allow_multiple_fills = allow;
        self
    }

    pub fn build(self) -> Result<Order> {
        fn required<T>(value: Option<T>, name: &str) -> Result<T> {
            value.ok_or_else(|| SwapError::InvalidOrder(format!("{} is required", name)))
        }

        let maker = required(self.maker, "maker")?;
        let receiver = required(self.receiver, "receiver")?;
        let maker_asset = required(self.maker_asset, "maker asset")?;
        let taker_asset = required(self.taker_asset, "taker asset")?;
        let making_amount = required(self.making_amount, "making amount")?;
        let taking_amount = required(self.taking_amount, "taking amount")?;
        let hashlock = required(self.hashlock, "hashlock")?;
        let timelocks = required(self.timelocks, "timelocks")?;
        let src_chain_id = required(self.src_chain_id, "source chain")?;
        let dst_chain_id = required(self.dst_chain_id, "destination chain")?;

        if src_chain_id == 0 || dst_chain_id == 0 {
            return Err(SwapError::InvalidOrder("chain id 0 is reserved".to_string()));
        }
        if src_chain_id == dst_chain_id {
            return Err(SwapError::InvalidOrder(format!(
                "source and destination chain are both {}",
                src_chain_id
            )));
        }
        if maker_asset.chain_id != src_chain_id {
            return Err(SwapError::InvalidOrder(format!(
                "maker asset lives on chain {}, not the source chain {}",
                maker_asset.chain_id, src_chain_id
            )));
        }
        if taker_asset.chain_id != dst_chain_id || receiver.chain_id != dst_chain_id {
            return Err(SwapError::InvalidOrder(format!(
                "taker asset and receiver must live on the destination chain {}",
                dst_chain_id
            )));
        }
        if making_amount == 0 || taking_amount == 0 {
            return Err(SwapError::InvalidOrder("amounts must be non-zero".to_string()));
        }
        if self.allow_partial_fills || self.allow_multiple_fills {
            return Err(SwapError::InvalidOrder("only single-fill orders are supported".to_string()));
        }
        if timelocks.deployed_at().is_some() {
            return Err(SwapError::InvalidOrder(
                "order timelocks must be relative, not anchored to a deployment".to_string(),
            ));
        }

        let mut rng = rand::thread_rng();
        let salt = self.salt.unwrap_or_else(|| U256::from(rng.gen::<u64>()));
        let nonce = self.nonce.unwrap_or_else(|| U256::from(rng.gen::<u64>()));

        Ok(Order {
            salt,
            maker,
            receiver,
            maker_asset,
            taker_asset,
            making_amount,
            taking_amount,
            hashlock,
            timelocks,
            src_chain_id,
            dst_chain_id,
            src_safety_deposit: self.src_safety_deposit,
            dst_safety_deposit: self.dst_safety_deposit,
            nonce,
            allow_partial_fills: false,
            allow_multiple_fills: false,
        })
    }
}

/// An order together with the maker's ECDSA signature over its hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOrder {
    order: Order,
    order_hash: H256,
    signature: Signature,
}

impl SignedOrder {
    pub fn sign(order: Order, wallet: &LocalWallet) -> Result<Self> {
        if wallet.address() != order.maker {
            return Err(SwapError::InvalidSignature(format!(
                "wallet {:?} is not the order maker {:?}",
                wallet.address(),
                order.maker
            )));
        }
        let order_hash = order.order_hash();
        let signature = wallet
            .sign_hash(order_hash)
            .map_err(|e| SwapError::InvalidSignature(e.to_string()))?;
        Ok(SignedOrder { order, order_hash, signature })
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn order_hash(&self) -> H256 {
        self.order_hash
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Checks the recorded hash still matches the terms and was signed by the maker.
    pub fn verify(&self) -> Result<()> {
        let recomputed = self.order.order_hash();
        if recomputed != self.order_hash {
            return Err(SwapError::InvalidSignature(format!(
                "order hash {:?} does not match terms ({:?})",
                self.order_hash, recomputed
            )));
        }
        self.signature
            .verify(recomputed, self.order.maker)
            .map_err(|e| SwapError::InvalidSignature(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::htlc::{Secret, TimeLockConfig};

    const MAKER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const OTHER_KEY: &str = "59c6995e998f97a5300194dc6916aa8c096e6d7d7f81a78f05791c43177926b8";

    fn wallet(key: &str) -> LocalWallet {
        key.parse().unwrap()
    }

    fn base_builder(maker: Address) -> OrderBuilder {
        Order::builder()
            .salt(U256::from(42u64))
            .nonce(U256::from(7u64))
            .maker(maker)
            .receiver(AccountId::new(1337, "0x0260a8311b4f1092db620b923e8d7d20e76dedcc"))
            .maker_asset(AssetId::new(1, "USDC", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"), 1_000_000_000)
            .taker_asset(
                AssetId::new(1337, "STRK", "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d"),
                1_000_000_000_000_000_000,
            )
            .hashlock(HashLock::for_secret(&Secret::from_bytes([9u8; 32])))
            .timelocks(TimeLocks::new(TimeLockConfig::default()).unwrap())
            .source_chain(1)
            .destination_chain(1337)
            .safety_deposits(1_000, 1_000)
    }

    #[test]
    fn hash_is_deterministic_and_term_sensitive() {
        let maker = wallet(MAKER_KEY).address();
        let a = base_builder(maker).build().unwrap();
        let b = base_builder(maker).build().unwrap();
        assert_eq!(a.order_hash(), b.order_hash());

        let other_salt = base_builder(maker).salt(U256::from(43u64)).build().unwrap();
        assert_ne!(a.order_hash(), other_salt.order_hash());

        let other_dst = base_builder(maker)
            .destination_chain(56)
            .taker_asset(AssetId::new(56, "BNB", "0xbb"), 5)
            .receiver(AccountId::new(56, "0xcc"))
            .build()
            .unwrap();
        assert_ne!(a.order_hash(), other_dst.order_hash());
    }

    #[test]
    fn destination_override_is_validated() {
        let maker = wallet(MAKER_KEY).address();
        let same_chain = base_builder(maker).destination_chain(1).build();
        assert!(matches!(same_chain, Err(SwapError::InvalidOrder(_))));

        let zero = base_builder(maker).destination_chain(0).build();
        assert!(matches!(zero, Err(SwapError::InvalidOrder(_))));

        // Receiver still on 1337 while the destination moved.
        let mismatch = base_builder(maker).destination_chain(56).build();
        assert!(matches!(mismatch, Err(SwapError::InvalidOrder(_))));
    }

    #[test]
    fn rejects_multi_fill_and_missing_terms() {
        let maker = wallet(MAKER_KEY).address();
        assert!(base_builder(maker).allow_partial_fills(true).build().is_err());
        assert!(base_builder(maker).allow_multiple_fills(true).build().is_err());
        assert!(Order::builder().maker(maker).build().is_err());

        let anchored = TimeLocks::new(TimeLockConfig::default()).unwrap().with_deployed_at(5);
        assert!(base_builder(maker).timelocks(anchored).build().is_err());
    }

    #[test]
    fn random_salt_and_nonce_when_unset() {
        let maker = wallet(MAKER_KEY).address();
        let mut builder = base_builder(maker);
        builder.salt = None;
        builder.nonce = None;
        let a = builder.clone().build().unwrap();
        let b = builder.build().unwrap();
        assert_ne!(a.order_hash(), b.order_hash());
    }

    #[test]
    fn sign_and_verify() {
        let maker_wallet = wallet(MAKER_KEY);
        let order = base_builder(maker_wallet.address()).build().unwrap();
        let signed = SignedOrder::sign(order.clone(), &maker_wallet).unwrap();
        assert_eq!(signed.order_hash(), order.order_hash());
        assert!(signed.verify().is_ok());
    }

    #[test]
    fn only_the_maker_can_sign() {
        let maker = wallet(MAKER_KEY).address();
        let order = base_builder(maker).build().unwrap();
        let result = SignedOrder::sign(order, &wallet(OTHER_KEY));
        assert!(matches!(result, Err(SwapError::InvalidSignature(_))));
    }

    #[test]
    fn changed_terms_invalidate_signature() {
        let maker_wallet = wallet(MAKER_KEY);
        let signed = SignedOrder::sign(base_builder(maker_wallet.address()).build().unwrap(), &maker_wallet).unwrap();
        let swapped_terms = base_builder(maker_wallet.address())
            .maker_asset(AssetId::new(1, "USDC", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"), 1)
            .build()
            .unwrap();
        let tampered = SignedOrder { order: swapped_terms, ..signed.clone() };
        assert!(matches!(tampered.verify(), Err(SwapError::InvalidSignature(_))));

        // Re-pointing the hash at the new terms breaks the signature instead.
        let rehashed = SignedOrder { order_hash: tampered.order.order_hash(), ..tampered };
        assert!(matches!(rehashed.verify(), Err(SwapError::InvalidSignature(_))));
    }

    #[test]
    fn signed_order_survives_json() {
        let maker_wallet = wallet(MAKER_KEY);
        let signed = SignedOrder::sign(base_builder(maker_wallet.address()).build().unwrap(), &maker_wallet).unwrap();
        let json = serde_json::to_string(&signed).unwrap();
        let restored: SignedOrder = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, signed);
        assert!(restored.verify().is_ok());
    }
}
