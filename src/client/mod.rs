use alloy::eips::BlockId;
use alloy::primitives::{Address, U256, U64};
use alloy::rpc::client::{ClientBuilder, ReqwestClient};
use eyre::{Result, WrapErr};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Url;

/// A type-erased request producer, ready to go into a [`Target`](crate::poll::Target).
pub type BoxRequest<R> = Box<dyn FnMut() -> BoxFuture<'static, Result<R>> + Send>;

#[derive(Clone)]
pub struct Client(ReqwestClient);

impl Client {
    pub fn new(provider_string: &str) -> Result<Self> {
        let url = Url::parse(provider_string)
            .wrap_err_with(|| format!("invalid provider url: {provider_string}"))?;
        // Instantiate a new client over a HTTP transport.
        Ok(Self(ClientBuilder::default().http(url)))
    }

    /// `eth_blockNumber`
    pub fn block_number(&self) -> BoxRequest<u64> {
        let client = self.0.clone();
        Box::new(move || {
            let client = client.clone();
            async move {
                let number: U64 = client.request("eth_blockNumber", ()).await?;
                Ok(number.to::<u64>())
            }
            .boxed()
        })
    }

    /// `eth_getBalance` of `address` at the latest block, in wei.
    pub fn balance(&self, address: Address) -> BoxRequest<U256> {
        let client = self.0.clone();
        Box::new(move || {
            let client = client.clone();
            async move {
                let balance: U256 = client
                    .request("eth_getBalance", (address, BlockId::latest()))
                    .await?;
                Ok(balance)
            }
            .boxed()
        })
    }
}
