#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, Cursor, Read};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use appeears::{
    ApiRequest, ApiResponse, Catalog, Clock, FileLister, Method, PollPolicy, Session,
    TaskOrchestrator, TaskStatusPoller, TaskSubmitter, Transport, TransportError,
};
use serde_json::{Value, json};

#[derive(Clone)]
enum Reply {
    Respond(u16, Vec<u8>),
    /// 200 whose body breaks after the given bytes.
    Truncated(Vec<u8>),
    Fail(String),
}

/// Yields `data`, then fails like a dropped connection.
struct BrokenBody {
    data: Cursor<Vec<u8>>,
}

impl Read for BrokenBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.data.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
            n => Ok(n),
        }
    }
}

/// In-memory stand-in for the remote service. Each route answers from a
/// queue; the last queued reply repeats.
#[derive(Default)]
pub struct MockService {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn json(&self, method: Method, path: &str, status: u16, body: Value) {
        self.push(method, path, Reply::Respond(status, body.to_string().into_bytes()));
    }

    pub fn bytes(&self, method: Method, path: &str, status: u16, body: &[u8]) {
        self.push(method, path, Reply::Respond(status, body.to_vec()));
    }

    /// Answers 200 but the connection drops after `prefix`.
    pub fn broken_body(&self, method: Method, path: &str, prefix: &[u8]) {
        self.push(method, path, Reply::Truncated(prefix.to_vec()));
    }

    pub fn fail(&self, method: Method, path: &str, message: &str) {
        self.push(method, path, Reply::Fail(message.to_string()));
    }

    /// Accepts the next submission as `task_id`.
    pub fn accept_task(&self, task_id: &str) {
        self.json(Method::Post, "task", 202, json!({"task_id": task_id}));
    }

    pub fn status(&self, task_id: &str, status: &str) {
        self.json(
            Method::Get,
            &format!("task/{task_id}"),
            200,
            json!({"status": status}),
        );
    }

    pub fn progress(&self, task_id: &str, percent: f64) {
        self.json(
            Method::Get,
            &format!("task/{task_id}"),
            200,
            json!({"status": "processing", "progress": {"summary": percent}}),
        );
    }

    pub fn bundle(&self, task_id: &str, files: Value) {
        self.json(
            Method::Get,
            &format!("bundle/{task_id}"),
            200,
            json!({"files": files}),
        );
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_to(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

impl Transport for MockService {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut routes = self.routes.lock().unwrap();
        let Some(queue) = routes.get_mut(&(request.method, request.path.clone())) else {
            return Ok(ApiResponse::new(
                404,
                Cursor::new(br#"{"message": "no such route"}"#.to_vec()),
            ));
        };

        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };

        match reply {
            Some(Reply::Respond(status, body)) => Ok(ApiResponse::new(status, Cursor::new(body))),
            Some(Reply::Truncated(data)) => Ok(ApiResponse::new(
                200,
                BrokenBody {
                    data: Cursor::new(data),
                },
            )),
            Some(Reply::Fail(message)) => Err(TransportError::Other(message)),
            None => Ok(ApiResponse::new(404, Cursor::new(Vec::new()))),
        }
    }
}

/// Clock that only moves when slept on.
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub fn session(service: &Arc<MockService>) -> Session {
    Session::with_token(service.clone(), "test-token")
}

pub fn submitter(service: &Arc<MockService>) -> TaskSubmitter {
    TaskSubmitter::new(session(service), Arc::new(Catalog::builtin().clone()))
}

pub fn poller(service: &Arc<MockService>, clock: &Arc<ManualClock>) -> TaskStatusPoller {
    TaskStatusPoller::new(session(service))
        .with_policy(PollPolicy::fixed(Duration::from_secs(5)))
        .with_clock(clock.clone())
}

pub fn orchestrator(service: &Arc<MockService>, clock: &Arc<ManualClock>) -> TaskOrchestrator {
    TaskOrchestrator::new(
        submitter(service),
        poller(service, clock),
        FileLister::new(session(service)),
    )
}
