//! Readiness poller
//!
//! Polls a check on a fixed interval until it passes or the attempt budget is
//! spent. The check is invoked at most `max_attempts` times and there is no
//! sleep after the final failed attempt.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use libstack_runner::ProcessRunner;

use crate::interrupt::InterruptFlag;
use crate::plan::ReadinessCheck;

/// Lines of command output kept as the failure detail
const DETAIL_TAIL_LINES: usize = 5;
/// Connect timeout for tcp checks and request timeout for http checks
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pauses between attempts. Tests substitute one that does not sleep.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Result of a single check invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Ready,
    /// Not ready yet, with what was observed
    NotReady(String),
}

/// Final result of polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { attempts: u32 },
    Timeout { attempts: u32, last_detail: String },
}

impl PollOutcome {
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Ready { attempts } | Self::Timeout { attempts, .. } => *attempts,
        }
    }
}

/// Polling stopped without a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    /// The check itself could not be evaluated (program missing, bad URL)
    Unavailable(String),
    Interrupted { attempts: u32 },
}

/// Runs checks with a budget and an interval.
pub struct ReadinessPoller<'a, S: Sleeper + ?Sized> {
    sleeper: &'a S,
    interrupt: Option<&'a InterruptFlag>,
}

impl<'a, S: Sleeper + ?Sized> ReadinessPoller<'a, S> {
    pub fn new(sleeper: &'a S) -> Self {
        Self {
            sleeper,
            interrupt: None,
        }
    }

    /// Stop between attempts once `flag` is set.
    #[must_use]
    pub fn with_interrupt(mut self, flag: &'a InterruptFlag) -> Self {
        self.interrupt = Some(flag);
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt.is_some_and(InterruptFlag::is_set)
    }

    /// Evaluate `check` until it reports ready or `max_attempts` is reached.
    ///
    /// A `max_attempts` of zero is treated as one.
    pub fn await_ready<F>(
        &self,
        mut check: F,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<PollOutcome, PollError>
    where
        F: FnMut() -> Result<CheckResult, String>,
    {
        let max_attempts = max_attempts.max(1);
        let mut last_detail = String::new();

        for attempt in 1..=max_attempts {
            match check().map_err(PollError::Unavailable)? {
                CheckResult::Ready => {
                    debug!(attempt, "Readiness check passed");
                    return Ok(PollOutcome::Ready { attempts: attempt });
                }
                CheckResult::NotReady(detail) => {
                    debug!(attempt, max_attempts, detail = %detail, "Not ready yet");
                    last_detail = detail;
                }
            }

            if attempt == max_attempts {
                break;
            }
            if self.interrupted() {
                return Err(PollError::Interrupted { attempts: attempt });
            }
            self.sleeper.sleep(interval);
            if self.interrupted() {
                return Err(PollError::Interrupted { attempts: attempt });
            }
        }

        info!(attempts = max_attempts, "Readiness budget exhausted");
        Ok(PollOutcome::Timeout {
            attempts: max_attempts,
            last_detail,
        })
    }
}

/// Evaluates a [`ReadinessCheck`] once.
///
/// HTTP checks use a `reqwest` client on a current-thread tokio runtime that
/// is built on first use.
pub struct CheckRunner<'r, R: ProcessRunner + ?Sized> {
    runner: &'r R,
    http: Option<HttpProbe>,
}

impl<'r, R: ProcessRunner + ?Sized> CheckRunner<'r, R> {
    pub fn new(runner: &'r R) -> Self {
        Self { runner, http: None }
    }

    /// `Err` means the check cannot be evaluated at all.
    pub fn check(
        &mut self,
        check: &ReadinessCheck,
        cwd: Option<&str>,
        env: &std::collections::BTreeMap<String, String>,
    ) -> Result<CheckResult, String> {
        match check {
            ReadinessCheck::Command(command) => {
                let output = self
                    .runner
                    .run(&command.to_spec(cwd, env))
                    .map_err(|e| e.to_string())?;
                if output.success() {
                    Ok(CheckResult::Ready)
                } else {
                    let tail = output.diagnostic_tail(DETAIL_TAIL_LINES);
                    let code = output
                        .exit_code
                        .map_or_else(|| "signal".to_string(), |c| format!("exit code {c}"));
                    Ok(CheckResult::NotReady(if tail.is_empty() {
                        format!("`{command}` returned {code}")
                    } else {
                        format!("`{command}` returned {code}: {tail}")
                    }))
                }
            }
            ReadinessCheck::Http { url, expect_status } => {
                if self.http.is_none() {
                    self.http = Some(HttpProbe::new()?);
                }
                match &self.http {
                    Some(probe) => probe.get(url, *expect_status),
                    None => Err("http probe unavailable".to_string()),
                }
            }
            ReadinessCheck::Tcp { host, port } => Ok(tcp_check(host, *port)),
        }
    }
}

fn tcp_check(host: &str, port: u16) -> CheckResult {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect::<Vec<_>>(),
        Err(e) => return CheckResult::NotReady(format!("cannot resolve {host}: {e}")),
    };
    let mut last = format!("{host}:{port} resolved to no addresses");
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, PROBE_TIMEOUT) {
            Ok(_) => return CheckResult::Ready,
            Err(e) => last = format!("connect {addr}: {e}"),
        }
    }
    CheckResult::NotReady(last)
}

struct HttpProbe {
    runtime: tokio::runtime::Runtime,
    client: reqwest::Client,
}

impl HttpProbe {
    fn new() -> Result<Self, String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("failed to start async runtime: {e}"))?;
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| format!("failed to build http client: {e}"))?;
        Ok(Self { runtime, client })
    }

    fn get(&self, url: &str, expect_status: Option<u16>) -> Result<CheckResult, String> {
        let result = self
            .runtime
            .block_on(async { self.client.get(url).send().await });
        match result {
            Ok(response) => {
                let status = response.status();
                let ready = match expect_status {
                    Some(code) => status.as_u16() == code,
                    None => status.is_success(),
                };
                Ok(if ready {
                    CheckResult::Ready
                } else {
                    CheckResult::NotReady(format!("GET {url} returned {status}"))
                })
            }
            Err(e) if e.is_builder() => Err(format!("invalid url {url}: {e}")),
            Err(e) => Ok(CheckResult::NotReady(format!("GET {url}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanCommand;
    use libstack_runner::{ScriptedResponse, ScriptedRunner};
    use proptest::prelude::*;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
        }
    }

    fn not_ready_until(ready_on: u32, calls: &Cell<u32>) -> impl FnMut() -> Result<CheckResult, String> + '_ {
        move || {
            calls.set(calls.get() + 1);
            if calls.get() >= ready_on {
                Ok(CheckResult::Ready)
            } else {
                Ok(CheckResult::NotReady(format!("attempt {}", calls.get())))
            }
        }
    }

    #[test]
    fn test_ready_on_first_attempt_does_not_sleep() {
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);
        let result = ReadinessPoller::new(&sleeper)
            .await_ready(not_ready_until(1, &calls), 10, Duration::from_secs(5))
            .unwrap();
        assert_eq!(result, PollOutcome::Ready { attempts: 1 });
        assert_eq!(calls.get(), 1);
        assert!(sleeper.sleeps.borrow().is_empty());
    }

    #[test]
    fn test_ready_on_fifth_invocation() {
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);
        let result = ReadinessPoller::new(&sleeper)
            .await_ready(not_ready_until(5, &calls), 10, Duration::from_secs(2))
            .unwrap();
        assert_eq!(result, PollOutcome::Ready { attempts: 5 });
        assert_eq!(calls.get(), 5);
        assert_eq!(*sleeper.sleeps.borrow(), vec![Duration::from_secs(2); 4]);
    }

    #[test]
    fn test_timeout_carries_last_detail_and_skips_final_sleep() {
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);
        let result = ReadinessPoller::new(&sleeper)
            .await_ready(not_ready_until(u32::MAX, &calls), 3, Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            result,
            PollOutcome::Timeout {
                attempts: 3,
                last_detail: "attempt 3".to_string()
            }
        );
        assert_eq!(sleeper.sleeps.borrow().len(), 2);
    }

    #[test]
    fn test_unavailable_check_stops_immediately() {
        let sleeper = RecordingSleeper::default();
        let result = ReadinessPoller::new(&sleeper).await_ready(
            || Err("program not found: pg_isready".to_string()),
            10,
            Duration::from_secs(1),
        );
        assert_eq!(
            result,
            Err(PollError::Unavailable("program not found: pg_isready".to_string()))
        );
        assert!(sleeper.sleeps.borrow().is_empty());
    }

    #[test]
    fn test_interrupt_between_attempts() {
        let sleeper = RecordingSleeper::default();
        let flag = InterruptFlag::new();
        let calls = Cell::new(0);
        let result = ReadinessPoller::new(&sleeper).with_interrupt(&flag).await_ready(
            || {
                calls.set(calls.get() + 1);
                if calls.get() == 2 {
                    flag.trigger();
                }
                Ok(CheckResult::NotReady("down".into()))
            },
            10,
            Duration::from_secs(1),
        );
        assert_eq!(result, Err(PollError::Interrupted { attempts: 2 }));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_command_check_through_runner() {
        let runner = ScriptedRunner::new();
        runner.on_sequence(
            "pg_isready",
            vec![
                ScriptedResponse::exit(2, "localhost:5432 - no response"),
                ScriptedResponse::success(),
            ],
        );
        let mut checks = CheckRunner::new(&runner);
        let check = ReadinessCheck::Command(PlanCommand::new(["pg_isready", "-h", "localhost"]));
        let env = BTreeMap::new();

        match checks.check(&check, None, &env).unwrap() {
            CheckResult::NotReady(detail) => assert!(detail.contains("no response"), "{detail}"),
            CheckResult::Ready => panic!("expected not ready"),
        }
        assert_eq!(checks.check(&check, None, &env).unwrap(), CheckResult::Ready);

        runner.on("missing-tool", ScriptedResponse::NotFound);
        let missing = ReadinessCheck::Command(PlanCommand::new(["missing-tool"]));
        assert!(checks.check(&missing, None, &env).is_err());
    }

    #[test]
    fn test_tcp_check_against_local_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert_eq!(tcp_check("127.0.0.1", port), CheckResult::Ready);
        drop(listener);
        assert!(matches!(tcp_check("127.0.0.1", port), CheckResult::NotReady(_)));
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_budget(max_attempts in 1u32..40, ready_on in 1u32..60) {
            let sleeper = RecordingSleeper::default();
            let calls = Cell::new(0);
            let result = ReadinessPoller::new(&sleeper)
                .await_ready(not_ready_until(ready_on, &calls), max_attempts, Duration::from_millis(10))
                .unwrap();

            prop_assert!(calls.get() <= max_attempts);
            prop_assert_eq!(result.attempts(), calls.get());
            prop_assert_eq!(sleeper.sleeps.borrow().len() as u32, calls.get() - 1);
            if ready_on <= max_attempts {
                prop_assert_eq!(result, PollOutcome::Ready { attempts: ready_on });
            } else {
                let is_timeout = matches!(result, PollOutcome::Timeout { .. });
                prop_assert!(is_timeout);
            }
        }
    }
}
