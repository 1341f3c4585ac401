//! Named daemon methods.
//!
//! [`DaemonApi`] enumerates the Bitcoin Core compatible methods this crate
//! knows about. Every provided method only builds positional params and
//! forwards to [`DaemonApi::call`], which is also the escape hatch for
//! methods not listed here. Structured results are returned as opaque
//! [`Value`]s; only scalar results are converted into Rust types.
//!
//! Reference: <https://developer.bitcoin.org/reference/rpc/index.html>

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::rpc::{Params, RpcClient, Transport};

/// A block addressed by hash or by height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BlockRef<'a> {
    Hash(&'a str),
    Height(u64),
}

/// Optional arguments of `sendtoaddress`.
#[derive(Debug, Clone, Default)]
pub struct SendOptions<'a> {
    pub comment: Option<&'a str>,
    pub comment_to: Option<&'a str>,
    pub subtract_fee_from_amount: bool,
    pub avoid_reuse: Option<bool>,
}

/// Optional arguments of `createwallet`.
#[derive(Debug, Clone, Default)]
pub struct CreateWalletOptions<'a> {
    pub disable_private_keys: bool,
    pub blank: bool,
    pub passphrase: Option<&'a str>,
    pub avoid_reuse: bool,
    pub descriptors: Option<bool>,
    pub load_on_startup: Option<bool>,
}

#[async_trait]
pub trait DaemonApi: Send + Sync {
    /// Call any daemon method by name.
    async fn call(&self, method: &str, params: Params) -> Result<Value, CoreError>;

    // ==========================================================================
    // Blockchain
    // ==========================================================================

    async fn get_blockchain_info(&self) -> Result<Value, CoreError> {
        self.call("getblockchaininfo", Params::None).await
    }

    async fn get_best_block_hash(&self) -> Result<String, CoreError> {
        let raw = self.call("getbestblockhash", Params::None).await?;
        decode_result("getbestblockhash", raw)
    }

    async fn get_block_count(&self) -> Result<u64, CoreError> {
        let raw = self.call("getblockcount", Params::None).await?;
        decode_result("getblockcount", raw)
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, CoreError> {
        let raw = self.call("getblockhash", args([json!(height)])).await?;
        decode_result("getblockhash", raw)
    }

    async fn get_block_header(&self, block_hash: &str, verbose: bool) -> Result<Value, CoreError> {
        self.call("getblockheader", args([json!(block_hash), json!(verbose)]))
            .await
    }

    /// `verbosity`: 0 for hex, 1 for txids, 2 for decoded transactions.
    async fn get_block(&self, block_hash: &str, verbosity: u8) -> Result<Value, CoreError> {
        self.call("getblock", args([json!(block_hash), json!(verbosity)]))
            .await
    }

    /// An empty `stats` slice asks for every statistic.
    async fn get_block_stats(
        &self,
        block: BlockRef<'_>,
        stats: &[&str],
    ) -> Result<Value, CoreError> {
        let stats = (!stats.is_empty()).then(|| json!(stats));
        self.call("getblockstats", args([json!(block), json!(stats)]))
            .await
    }

    async fn get_chain_tips(&self) -> Result<Value, CoreError> {
        self.call("getchaintips", Params::None).await
    }

    /// Proof-of-stake coins answer with an object instead of a number.
    async fn get_difficulty(&self) -> Result<Value, CoreError> {
        self.call("getdifficulty", Params::None).await
    }

    async fn get_mempool_info(&self) -> Result<Value, CoreError> {
        self.call("getmempoolinfo", Params::None).await
    }

    // ==========================================================================
    // Mining and network
    // ==========================================================================

    async fn get_mining_info(&self) -> Result<Value, CoreError> {
        self.call("getmininginfo", Params::None).await
    }

    /// `nblocks` of -1 averages since the last difficulty change.
    async fn get_network_hash_ps(
        &self,
        nblocks: i64,
        height: Option<u64>,
    ) -> Result<f64, CoreError> {
        let raw = self
            .call("getnetworkhashps", args([json!(nblocks), json!(height)]))
            .await?;
        decode_result("getnetworkhashps", raw)
    }

    async fn get_network_info(&self) -> Result<Value, CoreError> {
        self.call("getnetworkinfo", Params::None).await
    }

    async fn get_connection_count(&self) -> Result<u64, CoreError> {
        let raw = self.call("getconnectioncount", Params::None).await?;
        decode_result("getconnectioncount", raw)
    }

    // ==========================================================================
    // Raw transactions
    // ==========================================================================

    /// Without `-txindex`, transactions outside the mempool need `block_hash`.
    async fn get_raw_transaction(
        &self,
        txid: &str,
        verbose: bool,
        block_hash: Option<&str>,
    ) -> Result<Value, CoreError> {
        self.call(
            "getrawtransaction",
            args([json!(txid), json!(verbose), json!(block_hash)]),
        )
        .await
    }

    async fn create_raw_transaction(
        &self,
        inputs: Value,
        outputs: Value,
        locktime: u32,
    ) -> Result<String, CoreError> {
        let raw = self
            .call(
                "createrawtransaction",
                args([inputs, outputs, json!(locktime)]),
            )
            .await?;
        decode_result("createrawtransaction", raw)
    }

    async fn fund_raw_transaction(
        &self,
        hex: &str,
        options: Option<Value>,
        is_witness: Option<bool>,
    ) -> Result<Value, CoreError> {
        self.call(
            "fundrawtransaction",
            args([json!(hex), json!(options), json!(is_witness)]),
        )
        .await
    }

    async fn sign_raw_transaction_with_wallet(
        &self,
        hex: &str,
        prev_txs: Option<Value>,
        sighash_type: Option<&str>,
    ) -> Result<Value, CoreError> {
        self.call(
            "signrawtransactionwithwallet",
            args([json!(hex), json!(prev_txs), json!(sighash_type)]),
        )
        .await
    }

    /// Broadcast a signed transaction and return its txid.
    async fn send_raw_transaction(&self, hex: &str) -> Result<String, CoreError> {
        let raw = self.call("sendrawtransaction", args([json!(hex)])).await?;
        decode_result("sendrawtransaction", raw)
    }

    // ==========================================================================
    // Wallet
    // ==========================================================================

    async fn create_wallet(
        &self,
        wallet_name: &str,
        options: &CreateWalletOptions<'_>,
    ) -> Result<Value, CoreError> {
        self.call(
            "createwallet",
            args([
                json!(wallet_name),
                json!(options.disable_private_keys),
                json!(options.blank),
                json!(options.passphrase),
                json!(options.avoid_reuse),
                json!(options.descriptors),
                json!(options.load_on_startup),
            ]),
        )
        .await
    }

    async fn wallet_passphrase(&self, passphrase: &str, timeout_secs: u64) -> Result<(), CoreError> {
        let raw = self
            .call(
                "walletpassphrase",
                args([json!(passphrase), json!(timeout_secs)]),
            )
            .await?;
        decode_result("walletpassphrase", raw)
    }

    /// `address_type` is one of "legacy", "p2sh-segwit", "bech32".
    async fn get_new_address(
        &self,
        label: Option<&str>,
        address_type: Option<&str>,
    ) -> Result<String, CoreError> {
        let raw = self
            .call("getnewaddress", args([json!(label), json!(address_type)]))
            .await?;
        decode_result("getnewaddress", raw)
    }

    async fn import_pub_key(
        &self,
        pubkey: &str,
        label: Option<&str>,
        rescan: bool,
    ) -> Result<(), CoreError> {
        let raw = self
            .call(
                "importpubkey",
                args([json!(pubkey), json!(label.unwrap_or("")), json!(rescan)]),
            )
            .await?;
        decode_result("importpubkey", raw)
    }

    /// Send `amount` coins to `address` and return the txid.
    async fn send_to_address(
        &self,
        address: &str,
        amount: f64,
        options: &SendOptions<'_>,
    ) -> Result<String, CoreError> {
        let raw = self
            .call(
                "sendtoaddress",
                args([
                    json!(address),
                    json!(amount),
                    json!(options.comment),
                    json!(options.comment_to),
                    json!(options.subtract_fee_from_amount),
                    json!(options.avoid_reuse),
                ]),
            )
            .await?;
        decode_result("sendtoaddress", raw)
    }

    async fn list_received_by_address(
        &self,
        min_conf: u32,
        include_empty: bool,
        include_watch_only: Option<bool>,
        address_filter: Option<&str>,
    ) -> Result<Value, CoreError> {
        self.call(
            "listreceivedbyaddress",
            args([
                json!(min_conf),
                json!(include_empty),
                json!(include_watch_only),
                json!(address_filter),
            ]),
        )
        .await
    }

    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: &[&str],
        include_unsafe: bool,
        query_options: Option<Value>,
    ) -> Result<Value, CoreError> {
        self.call(
            "listunspent",
            args([
                json!(min_conf),
                json!(max_conf),
                json!(addresses),
                json!(include_unsafe),
                json!(query_options),
            ]),
        )
        .await
    }

    // ==========================================================================
    // PSBT
    // ==========================================================================

    async fn analyze_psbt(&self, psbt: &str) -> Result<Value, CoreError> {
        self.call("analyzepsbt", args([json!(psbt)])).await
    }

    async fn combine_psbt(&self, psbts: &[&str]) -> Result<String, CoreError> {
        let raw = self.call("combinepsbt", args([json!(psbts)])).await?;
        decode_result("combinepsbt", raw)
    }

    async fn decode_psbt(&self, psbt: &str) -> Result<Value, CoreError> {
        self.call("decodepsbt", args([json!(psbt)])).await
    }

    /// With `extract`, a complete PSBT also yields the network transaction hex.
    async fn finalize_psbt(&self, psbt: &str, extract: bool) -> Result<Value, CoreError> {
        self.call("finalizepsbt", args([json!(psbt), json!(extract)]))
            .await
    }

    async fn join_psbts(&self, psbts: &[&str]) -> Result<String, CoreError> {
        let raw = self.call("joinpsbts", args([json!(psbts)])).await?;
        decode_result("joinpsbts", raw)
    }

    async fn utxo_update_psbt(
        &self,
        psbt: &str,
        descriptors: Option<Value>,
    ) -> Result<String, CoreError> {
        let raw = self
            .call("utxoupdatepsbt", args([json!(psbt), json!(descriptors)]))
            .await?;
        decode_result("utxoupdatepsbt", raw)
    }

    async fn wallet_process_psbt(
        &self,
        psbt: &str,
        sign: bool,
        sighash_type: &str,
        bip32_derivs: bool,
    ) -> Result<Value, CoreError> {
        self.call(
            "walletprocesspsbt",
            args([
                json!(psbt),
                json!(sign),
                json!(sighash_type),
                json!(bip32_derivs),
            ]),
        )
        .await
    }
}

#[async_trait]
impl<T: Transport> DaemonApi for RpcClient<T> {
    async fn call(&self, method: &str, params: Params) -> Result<Value, CoreError> {
        self.invoke(method, params).await
    }
}

/// Positional params with trailing nulls dropped, so the daemon applies its
/// own defaults for omitted optional arguments.
fn args<const N: usize>(values: [Value; N]) -> Params {
    let mut values = Vec::from(values);
    while values.last().is_some_and(Value::is_null) {
        values.pop();
    }
    Params::Positional(values)
}

fn decode_result<T: DeserializeOwned>(method: &str, raw: Value) -> Result<T, CoreError> {
    serde_json::from_value(raw).map_err(|e| CoreError::InvalidResult {
        method: method.to_owned(),
        message: e.to_string(),
    })
}
