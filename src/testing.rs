//! Test doubles for the capability traits.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::net::{Network, Request, Response};
use crate::storage::Storage;

/// Scripted network.
///
/// GET responses are keyed by URL and served repeatedly. Form posts consume a
/// queue of scripted results; an empty queue answers 200. While offline every
/// call fails with [`Error::Offline`].
pub struct MockNetwork {
    online: AtomicBool,
    routes: Mutex<HashMap<String, Response>>,
    posts: Mutex<VecDeque<Result<Response>>>,
    fetched: Mutex<Vec<String>>,
    posted: Mutex<Vec<Vec<(String, String)>>>,
    offline_after: Mutex<Option<usize>>,
    gate: Mutex<Option<PostGate>>,
}

/// Holds one form post open until released.
#[derive(Clone, Default)]
pub struct PostGate {
    /// Signalled once the post has reached the network.
    pub entered: Arc<Notify>,
    /// Lets the held post complete.
    pub release: Arc<Notify>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            routes: Mutex::new(HashMap::new()),
            posts: Mutex::new(VecDeque::new()),
            fetched: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
            offline_after: Mutex::new(None),
            gate: Mutex::new(None),
        }
    }

    /// Drops the connection once `posts` forms have been posted.
    pub fn offline_after_posts(&self, posts: usize) {
        *self.offline_after.lock().unwrap() = Some(posts);
    }

    /// Holds the next form post until the returned gate is released.
    pub fn hold_next_post(&self) -> PostGate {
        let gate = PostGate::default();
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn route(&self, url: &str, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn route_ok(&self, url: &str, body: &str) {
        self.route(url, Response::new(200, "OK", body.to_string()));
    }

    pub fn push_post(&self, result: Result<Response>) {
        self.posts.lock().unwrap().push_back(result);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn posted(&self) -> Vec<Vec<(String, String)>> {
        self.posted.lock().unwrap().clone()
    }

    /// Value of `field` in every posted form, in posting order.
    pub fn posted_field(&self, field: &str) -> Vec<String> {
        self.posted()
            .iter()
            .filter_map(|form| {
                form.iter()
                    .find(|(name, _)| name == field)
                    .map(|(_, value)| value.clone())
            })
            .collect()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.fetched.lock().unwrap().push(request.url.clone());
        if !self.is_online() {
            return Err(Error::Offline);
        }
        self.routes
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .ok_or(Error::Offline)
    }

    async fn post_form(&self, _url: &str, fields: &[(String, String)]) -> Result<Response> {
        if !self.is_online() {
            return Err(Error::Offline);
        }
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let count = {
            let mut posted = self.posted.lock().unwrap();
            posted.push(fields.to_vec());
            posted.len()
        };
        if *self.offline_after.lock().unwrap() == Some(count) {
            self.set_online(false);
        }
        self.posts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Response::new(200, "OK", "{\"ok\":true}")))
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Clock whose time only moves when told to. `sleep` advances it instantly
/// and records the requested delay.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

/// Storage that refuses every operation.
pub struct BrokenStorage;

#[async_trait]
impl Storage for BrokenStorage {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::Storage("quota exceeded".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::Storage("quota exceeded".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Err(Error::Storage("quota exceeded".to_string()))
    }
}
