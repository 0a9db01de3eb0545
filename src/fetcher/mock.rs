use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::fetcher::{FetchRequest, FetchResult, Fetcher};

struct Route {
    pattern: String,
    responses: VecDeque<FetchResult>,
}

/// In-memory fetcher answering from scripted routes.
///
/// A route matches when its pattern is a substring of the request URL; routes
/// are tried in insertion order. Each route replays its responses in order and
/// keeps repeating the last one.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<(FetchRequest, Duration)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: &str, responses: Vec<FetchResult>) -> Self {
        self.routes.lock().unwrap().push(Route {
            pattern: pattern.to_string(),
            responses: responses.into(),
        });
        self
    }

    pub fn on_body(self, pattern: &str, body: impl Into<String>) -> Self {
        self.on(pattern, vec![FetchResult::Success(body.into().into_bytes())])
    }

    pub fn calls(&self) -> Vec<(FetchRequest, Duration)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(request, _)| request.url.contains(pattern))
            .count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest, timeout: Duration) -> FetchResult {
        self.calls.lock().unwrap().push((request.clone(), timeout));

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .find(|r| request.url.contains(&r.pattern) && !r.responses.is_empty());

        match route {
            Some(route) if route.responses.len() > 1 => route.responses.pop_front().unwrap(),
            Some(route) => route.responses[0].clone(),
            None => FetchResult::TransportError(format!("no scripted response for {}", request.url)),
        }
    }
}
