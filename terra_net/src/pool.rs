use rand::seq::SliceRandom;
use reqwest::{Client, Proxy};
use terra_shared::config::{ProxyEntry, HTTP_POOL_SIZE};

/// A client built per proxy, so each carries its own connection pool; a
/// request picks one client uniformly at random (spec §4.3 "On each
/// outbound request the client picks one uniformly at random").
pub struct ProxyPool {
    clients: Vec<(String, Client)>,
}

impl ProxyPool {
    pub fn new(proxies: &[ProxyEntry]) -> anyhow::Result<Self> {
        let mut clients = Vec::with_capacity(proxies.len().max(1));
        if proxies.is_empty() {
            clients.push(("direct".to_string(), build_client(None, None)?));
        } else {
            for p in proxies {
                let http = Proxy::http(&p.http)?;
                let https = Proxy::https(&p.https)?;
                clients.push((p.id.clone(), build_client(Some(http), Some(https))?));
            }
        }
        Ok(Self { clients })
    }

    /// Picks a client uniformly at random (spec §4.3). Never empty: falls
    /// back to a direct (proxy-less) client when no proxies were supplied.
    pub fn next(&self) -> &Client {
        &self
            .clients
            .choose(&mut rand::thread_rng())
            .expect("pool is never constructed empty")
            .1
    }
}

fn build_client(http: Option<Proxy>, https: Option<Proxy>) -> anyhow::Result<Client> {
    let mut builder = Client::builder().pool_max_idle_per_host(HTTP_POOL_SIZE);
    if let Some(p) = http {
        builder = builder.proxy(p);
    }
    if let Some(p) = https {
        builder = builder.proxy(p);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_proxy_list_still_yields_a_usable_client() {
        let pool = ProxyPool::new(&[]).expect("direct pool");
        let _client = pool.next();
    }

    #[test]
    fn proxy_entries_build_one_client_per_entry() {
        let proxies = vec![ProxyEntry {
            id: "p1".into(),
            http: "http://127.0.0.1:8080".into(),
            https: "http://127.0.0.1:8080".into(),
        }];
        let pool = ProxyPool::new(&proxies).expect("pool with one proxy");
        let _client = pool.next();
    }
}
