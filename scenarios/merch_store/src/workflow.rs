use http_stampede_runner::prelude::{
    Checker, DelegatedShutdownListener, HttpClientInstrumented, HttpRequest, HttpResponse,
    IterationAbortError, Metrics, RandomSource, TransportError,
};
use serde::Deserialize;
use serde_json::json;

pub const REGISTER: &str = "register";
pub const LOGIN: &str = "login";
pub const INFO: &str = "info";
pub const SEND_COIN: &str = "send_coin";
pub const MERCH: &str = "merch";
pub const BUY: &str = "buy";

/// Rate of iterations that had at least one failed check or could not complete.
pub const ITERATION_FAILED_METRIC: &str = "iteration_failed";

/// The `[scenario]` section of the run configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MerchStoreConfig {
    /// Items that can be bought. One is picked at random for each purchase.
    pub items: Vec<String>,
    pub transfer_amount: u64,
    /// Users that coins are sent to, by id. Both ends are included.
    pub receiver_range: (u64, u64),
    pub password: String,
}

impl Default for MerchStoreConfig {
    fn default() -> Self {
        Self {
            items: [
                "t-shirt",
                "cup",
                "book",
                "pen",
                "powerbank",
                "hoody",
                "umbrella",
                "socks",
                "wallet",
                "pink-hoody",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            transfer_amount: 10,
            receiver_range: (1, 20),
            password: "testpassword".to_string(),
        }
    }
}

impl MerchStoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.items.is_empty() {
            anyhow::bail!("At least one item must be configured");
        }
        let (low, high) = self.receiver_range;
        if low > high {
            anyhow::bail!("Receiver range [{low}, {high}] is empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Every step ran. Failed checks were recorded but did not stop the iteration.
    Completed { failed_checks: usize },
    /// The run is shutting down, the steps after this one were skipped.
    Interrupted { after_step: &'static str },
}

/// One pass through the merch store workflow for a single user.
pub struct Iteration<'a> {
    pub client: &'a HttpClientInstrumented,
    pub checker: &'a Checker,
    pub metrics: &'a Metrics,
    pub config: &'a MerchStoreConfig,
    pub rng: &'a mut RandomSource,
    pub shutdown_listener: &'a mut DelegatedShutdownListener,
    pub session_token: &'a mut Option<String>,
    pub username: String,
    failed_checks: usize,
}

impl<'a> Iteration<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: &'a HttpClientInstrumented,
        checker: &'a Checker,
        metrics: &'a Metrics,
        config: &'a MerchStoreConfig,
        rng: &'a mut RandomSource,
        shutdown_listener: &'a mut DelegatedShutdownListener,
        session_token: &'a mut Option<String>,
        username: String,
    ) -> Self {
        Self {
            client,
            checker,
            metrics,
            config,
            rng,
            shutdown_listener,
            session_token,
            username,
            failed_checks: 0,
        }
    }

    /// Run the steps in order. A failed check does not stop the iteration, but without a token from
    /// the login step there is nothing the remaining steps can do and an [IterationAbortError] is
    /// returned.
    pub async fn run(mut self) -> anyhow::Result<IterationOutcome> {
        let credentials = json!({
            "username": self.username,
            "password": self.config.password,
        });

        let response = self
            .client
            .send(
                REGISTER,
                HttpRequest::post("/api/auth/register").json(credentials.clone()),
            )
            .await;
        self.check("registration accepted", &response, |status| {
            status == 200 || status == 201
        });
        if self.shutdown_listener.should_shutdown() {
            return Ok(IterationOutcome::Interrupted {
                after_step: REGISTER,
            });
        }

        let response = self
            .client
            .send(LOGIN, HttpRequest::post("/api/auth/login").json(credentials))
            .await;
        let logged_in = self.check("login succeeded", &response, |status| status == 200);
        if self.shutdown_listener.should_shutdown() {
            return Ok(IterationOutcome::Interrupted { after_step: LOGIN });
        }

        let token = response
            .ok()
            .filter(|_| logged_in)
            .and_then(|r| r.json_field("token"));
        let Some(token) = token else {
            self.metrics.record_outcome(ITERATION_FAILED_METRIC, true);
            return Err(IterationAbortError::new(LOGIN, "login did not return a token").into());
        };
        *self.session_token = Some(token.clone());

        let response = self
            .client
            .send(INFO, HttpRequest::get("/api/info").bearer(&token))
            .await;
        self.check("read succeeded", &response, |status| status == 200);
        if self.shutdown_listener.should_shutdown() {
            return Ok(IterationOutcome::Interrupted { after_step: INFO });
        }

        let (low, high) = self.config.receiver_range;
        let receiver_id = self.rng.in_range(low..=high);
        let response = self
            .client
            .send(
                SEND_COIN,
                HttpRequest::post("/api/send-coin")
                    .json(json!({
                        "receiver_id": receiver_id,
                        "amount": self.config.transfer_amount,
                    }))
                    .bearer(&token),
            )
            .await;
        self.check("transfer accepted", &response, |status| status == 200);
        if self.shutdown_listener.should_shutdown() {
            return Ok(IterationOutcome::Interrupted {
                after_step: SEND_COIN,
            });
        }

        let response = self
            .client
            .send(MERCH, HttpRequest::get("/api/merch").bearer(&token))
            .await;
        self.check("catalog succeeded", &response, |status| status == 200);
        if self.shutdown_listener.should_shutdown() {
            return Ok(IterationOutcome::Interrupted { after_step: MERCH });
        }

        let item = self
            .rng
            .choose(&self.config.items)
            .ok_or_else(|| IterationAbortError::new(BUY, "no items to buy"))?;
        let response = self
            .client
            .send(
                BUY,
                HttpRequest::post(format!("/api/merch/buy/{item}")).bearer(&token),
            )
            .await;
        self.check("purchase accepted", &response, |status| status == 200);

        self.metrics
            .record_outcome(ITERATION_FAILED_METRIC, self.failed_checks > 0);

        Ok(IterationOutcome::Completed {
            failed_checks: self.failed_checks,
        })
    }

    fn check(
        &mut self,
        name: &str,
        response: &Result<HttpResponse, TransportError>,
        expected: impl Fn(u16) -> bool,
    ) -> bool {
        let passed = matches!(response, Ok(r) if expected(r.status));
        if !self.checker.check(name, passed) {
            self.failed_checks += 1;
        }
        passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_stampede_runner::prelude::{async_trait, ShutdownHandle, Transport};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Answers requests from a fixed table of `(path prefix, status, body)` and records every request.
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        routes: Vec<(&'static str, Option<u16>, &'static str)>,
        requests: Mutex<Vec<HttpRequest>>,
        shutdown_after: Option<(&'static str, ShutdownHandle)>,
    }

    impl ScriptedTransport {
        fn healthy() -> Self {
            Self {
                routes: vec![
                    ("/api/auth/register", Some(200), r#"{"token":"reg"}"#),
                    ("/api/auth/login", Some(200), r#"{"token":"abc"}"#),
                    ("/api/info", Some(200), r#"{"coins":1000}"#),
                    ("/api/send-coin", Some(200), r#"{"message":"ok"}"#),
                    ("/api/merch/buy/", Some(200), ""),
                    ("/api/merch", Some(200), "[]"),
                ],
                ..Default::default()
            }
        }

        fn with_route(
            mut self,
            prefix: &'static str,
            status: Option<u16>,
            body: &'static str,
        ) -> Self {
            self.routes.insert(0, (prefix, status, body));
            self
        }

        fn paths(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.path.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());

            if let Some((path, handle)) = &self.shutdown_after {
                if request.path == *path {
                    handle.shutdown();
                }
            }

            let (_, status, body) = self
                .routes
                .iter()
                .find(|(prefix, _, _)| request.path.starts_with(prefix))
                .ok_or_else(|| TransportError::Request(format!("no route for {}", request.path)))?;

            match status {
                Some(status) => Ok(HttpResponse {
                    status: *status,
                    body: body.to_string(),
                    latency: Duration::from_millis(5),
                }),
                None => Err(TransportError::Request("connection reset".to_string())),
            }
        }
    }

    struct Harness {
        transport: Arc<ScriptedTransport>,
        client: HttpClientInstrumented,
        metrics: Arc<Metrics>,
        checker: Checker,
        config: MerchStoreConfig,
        shutdown_handle: ShutdownHandle,
    }

    impl Harness {
        fn new(transport: ScriptedTransport) -> Self {
            let transport = Arc::new(transport);
            let metrics = Arc::new(Metrics::new());
            Self {
                client: HttpClientInstrumented::new(transport.clone(), metrics.clone()),
                checker: Checker::new(metrics.clone()),
                transport,
                metrics,
                config: MerchStoreConfig::default(),
                shutdown_handle: ShutdownHandle::new(),
            }
        }

        async fn run(
            &self,
            rng: &mut RandomSource,
            session_token: &mut Option<String>,
        ) -> anyhow::Result<IterationOutcome> {
            let mut listener = self.shutdown_handle.new_listener();
            Iteration::new(
                &self.client,
                &self.checker,
                &self.metrics,
                &self.config,
                rng,
                &mut listener,
                session_token,
                "user_test_1_0".to_string(),
            )
            .run()
            .await
        }

        fn rate(&self, name: &str) -> Option<f64> {
            self.metrics.snapshot().rate(name).and_then(|r| r.fraction())
        }
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let harness = Harness::new(ScriptedTransport::healthy());
        let mut token = None;

        let outcome = harness
            .run(&mut RandomSource::from_seed(1), &mut token)
            .await
            .unwrap();

        assert_eq!(IterationOutcome::Completed { failed_checks: 0 }, outcome);
        let paths = harness.transport.paths();
        assert_eq!(
            vec![
                "/api/auth/register",
                "/api/auth/login",
                "/api/info",
                "/api/send-coin",
                "/api/merch",
            ],
            paths[..5].to_vec()
        );
        assert!(paths[5].starts_with("/api/merch/buy/"));
        assert_eq!(Some("abc".to_string()), token);

        let requests = harness.transport.requests.lock().unwrap().clone();
        assert!(requests[..2].iter().all(|r| r.bearer.is_none()));
        assert!(requests[2..].iter().all(|r| r.bearer.as_deref() == Some("abc")));
        assert_eq!("user_test_1_0", requests[0].body.as_ref().unwrap()["username"]);
        assert_eq!("testpassword", requests[1].body.as_ref().unwrap()["password"]);
        assert_eq!(10, requests[3].body.as_ref().unwrap()["amount"]);

        assert_eq!(Some(1.0), harness.rate("checks"));
        assert_eq!(Some(0.0), harness.rate("http_req_failed"));
        assert_eq!(Some(0.0), harness.rate(ITERATION_FAILED_METRIC));
        let snapshot = harness.metrics.snapshot();
        assert_eq!(6, snapshot.distribution("http_req_duration").unwrap().count());
        for step in [REGISTER, LOGIN, INFO, SEND_COIN, MERCH, BUY] {
            let metric = format!("http_req_duration.{step}");
            assert_eq!(1, snapshot.distribution(&metric).unwrap().count(), "{metric}");
        }
    }

    #[tokio::test]
    async fn registration_accepts_created() {
        let harness = Harness::new(
            ScriptedTransport::healthy().with_route("/api/auth/register", Some(201), ""),
        );

        harness
            .run(&mut RandomSource::from_seed(1), &mut None)
            .await
            .unwrap();

        assert_eq!(Some(1.0), harness.rate("registration accepted"));
    }

    #[tokio::test]
    async fn missing_token_skips_remaining_steps() {
        let harness = Harness::new(ScriptedTransport::healthy().with_route(
            "/api/auth/login",
            Some(401),
            r#"{"errors":"bad"}"#,
        ));
        let mut token = None;

        let err = harness
            .run(&mut RandomSource::from_seed(1), &mut token)
            .await
            .unwrap_err();

        let abort = err.downcast_ref::<IterationAbortError>().unwrap();
        assert_eq!(LOGIN, abort.step());
        assert_eq!(
            vec!["/api/auth/register", "/api/auth/login"],
            harness.transport.paths()
        );
        assert_eq!(None, token);

        // Checks from the steps that did run are kept.
        assert_eq!(Some(1.0), harness.rate("registration accepted"));
        assert_eq!(Some(0.0), harness.rate("login succeeded"));
        assert_eq!(None, harness.rate("read succeeded"));
        assert_eq!(Some(1.0), harness.rate(ITERATION_FAILED_METRIC));
    }

    #[tokio::test]
    async fn token_from_failed_login_is_not_used() {
        let harness = Harness::new(ScriptedTransport::healthy().with_route(
            "/api/auth/login",
            Some(500),
            r#"{"token":"stale"}"#,
        ));
        let mut token = None;

        let err = harness
            .run(&mut RandomSource::from_seed(1), &mut token)
            .await
            .unwrap_err();

        assert!(err.is::<IterationAbortError>());
        assert_eq!(2, harness.transport.paths().len());
        assert_eq!(None, token);
        assert_eq!(Some(0.0), harness.rate("login succeeded"));
        assert_eq!(Some(1.0), harness.rate(ITERATION_FAILED_METRIC));
    }

    #[tokio::test]
    async fn login_transport_error_skips_remaining_steps() {
        let harness =
            Harness::new(ScriptedTransport::healthy().with_route("/api/auth/login", None, ""));

        let err = harness
            .run(&mut RandomSource::from_seed(1), &mut None)
            .await
            .unwrap_err();

        assert!(err.is::<IterationAbortError>());
        assert_eq!(2, harness.transport.paths().len());
        assert_eq!(Some(0.5), harness.rate("http_req_failed"));
    }

    #[tokio::test]
    async fn failed_check_does_not_stop_the_iteration() {
        let harness = Harness::new(ScriptedTransport::healthy().with_route(
            "/api/send-coin",
            Some(400),
            r#"{"errors":"not enough coins"}"#,
        ));

        let outcome = harness
            .run(&mut RandomSource::from_seed(1), &mut None)
            .await
            .unwrap();

        assert_eq!(IterationOutcome::Completed { failed_checks: 1 }, outcome);
        assert_eq!(6, harness.transport.paths().len());
        assert_eq!(Some(0.0), harness.rate("transfer accepted"));
        assert_eq!(Some(1.0), harness.rate("purchase accepted"));
        assert_eq!(Some(1.0 / 6.0), harness.rate("http_req_failed"));
        assert_eq!(Some(1.0), harness.rate(ITERATION_FAILED_METRIC));
    }

    #[tokio::test]
    async fn transport_error_fails_check_and_continues() {
        let harness = Harness::new(ScriptedTransport::healthy().with_route("/api/info", None, ""));

        let outcome = harness
            .run(&mut RandomSource::from_seed(1), &mut None)
            .await
            .unwrap();

        assert_eq!(IterationOutcome::Completed { failed_checks: 1 }, outcome);
        assert_eq!(6, harness.transport.paths().len());
        assert_eq!(Some(0.0), harness.rate("read succeeded"));
        // No response means no latency to record.
        let snapshot = harness.metrics.snapshot();
        assert_eq!(5, snapshot.distribution("http_req_duration").unwrap().count());
        assert!(snapshot.distribution("http_req_duration.info").is_none());
    }

    #[tokio::test]
    async fn same_seed_makes_same_choices() {
        let first = Harness::new(ScriptedTransport::healthy());
        let second = Harness::new(ScriptedTransport::healthy());

        first
            .run(&mut RandomSource::for_vu(99, 4), &mut None)
            .await
            .unwrap();
        second
            .run(&mut RandomSource::for_vu(99, 4), &mut None)
            .await
            .unwrap();

        let first_requests = first.transport.requests.lock().unwrap().clone();
        let second_requests = second.transport.requests.lock().unwrap().clone();
        assert_eq!(first_requests, second_requests);

        let receiver = first_requests[3].body.as_ref().unwrap()["receiver_id"]
            .as_u64()
            .unwrap();
        assert!((1..=20).contains(&receiver));
        let item = first_requests[5].path.trim_start_matches("/api/merch/buy/");
        assert!(MerchStoreConfig::default().items.iter().any(|i| i == item));
    }

    #[tokio::test]
    async fn shutdown_interrupts_between_steps() {
        let handle = ShutdownHandle::new();
        let mut transport = ScriptedTransport::healthy();
        transport.shutdown_after = Some(("/api/info", handle.clone()));
        let mut harness = Harness::new(transport);
        harness.shutdown_handle = handle;

        let outcome = harness
            .run(&mut RandomSource::from_seed(1), &mut None)
            .await
            .unwrap();

        assert_eq!(IterationOutcome::Interrupted { after_step: INFO }, outcome);
        assert_eq!(3, harness.transport.paths().len());
        // The in-flight request is still measured, but the iteration is not counted as failed.
        assert_eq!(Some(1.0), harness.rate("read succeeded"));
        assert_eq!(None, harness.rate(ITERATION_FAILED_METRIC));
    }

    #[test]
    fn config_defaults_fill_missing_keys() {
        let config: MerchStoreConfig = toml::from_str(
            r#"
items = ["cup"]
receiver_range = [5, 6]
"#,
        )
        .unwrap();

        assert_eq!(vec!["cup".to_string()], config.items);
        assert_eq!((5, 6), config.receiver_range);
        assert_eq!(10, config.transfer_amount);
        assert_eq!("testpassword", config.password);
        config.validate().unwrap();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MerchStoreConfig {
            items: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MerchStoreConfig {
            receiver_range: (20, 1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
