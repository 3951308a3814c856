//! Execution engine - runs one invocation against one resource

use crate::context::{Facts, ProgressCallback, Transport};
use crate::dispatcher::StateDispatcher;
use crate::error::Result;
use crate::projection::project;
use crate::resource::ResourceSchema;
use crate::types::{Command, ConfigTree, ExecuteOptions, ExecuteSummary, Request};
use log::{debug, info};
use serde::Serialize;

/// Result of one invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    /// At least one request was (or in check mode would be) sent
    pub changed: bool,
    pub commands: Vec<Command>,
    pub requests: Vec<Request>,
    /// Have tree fetched before planning
    pub before: ConfigTree,
    /// Re-fetched tree, or the projection in check mode
    pub after: ConfigTree,
    /// Tree predicted by replaying the commands against `before`
    pub projected: ConfigTree,
    pub summary: ExecuteSummary,
}

/// Run one invocation: fetch, plan, and unless in check mode, submit
///
/// Requests are sent one at a time in plan order so each one can be
/// reported to `progress`. The first transport failure aborts the rest and
/// is returned as is; requests already sent stay applied.
///
/// # Type Parameters
/// * `S` - Resource schema type
/// * `F` - Facts source type
/// * `T` - Transport type
/// * `P` - Progress callback type
pub fn run<S, F, T, P>(
    schema: &S,
    options: ExecuteOptions,
    want: Option<&ConfigTree>,
    facts: &F,
    transport: &T,
    progress: &mut P,
) -> Result<Outcome>
where
    S: ResourceSchema + ?Sized,
    F: Facts + ?Sized,
    T: Transport + ?Sized,
    P: ProgressCallback + ?Sized,
{
    invoke(schema, options, want, facts, |requests| {
        progress.on_batch_start(requests.len());
        for request in requests {
            progress.on_request_start(request);
            debug!("{}: sending {request}", schema.name());
            let result = transport.send(request);
            progress.on_request_complete(request, result.is_ok());
            if result.is_err() {
                progress.on_batch_complete();
                return result;
            }
        }
        progress.on_batch_complete();
        Ok(())
    })
}

/// Simple execution without progress reporting
///
/// The whole plan goes to the transport as one [`Transport::submit`] batch.
pub fn run_simple<S, F, T>(
    schema: &S,
    options: ExecuteOptions,
    want: Option<&ConfigTree>,
    facts: &F,
    transport: &T,
) -> Result<Outcome>
where
    S: ResourceSchema + ?Sized,
    F: Facts + ?Sized,
    T: Transport + ?Sized,
{
    invoke(schema, options, want, facts, |requests| {
        debug!("{}: submitting {} request(s)", schema.name(), requests.len());
        transport.submit(requests)
    })
}

fn invoke<S, F>(
    schema: &S,
    options: ExecuteOptions,
    want: Option<&ConfigTree>,
    facts: &F,
    send: impl FnOnce(&[Request]) -> Result<()>,
) -> Result<Outcome>
where
    S: ResourceSchema + ?Sized,
    F: Facts + ?Sized,
{
    let name = schema.name();
    let before = facts.fetch(name)?;
    let plan = StateDispatcher::new(schema).dispatch(options.state, want, &before)?;
    let projected = project(schema, &before, &plan.commands)?;

    if plan.is_empty() {
        debug!("{name}: nothing to change");
        return Ok(Outcome {
            changed: false,
            commands: Vec::new(),
            requests: Vec::new(),
            after: before.clone(),
            before,
            projected,
            summary: ExecuteSummary::default(),
        });
    }

    if options.check_mode {
        info!("{name}: check mode, {} request(s) not sent", plan.requests.len());
        return Ok(Outcome {
            changed: true,
            commands: plan.commands,
            requests: plan.requests,
            before,
            after: projected.clone(),
            projected,
            summary: ExecuteSummary::default(),
        });
    }

    send(&plan.requests)?;
    let mut summary = ExecuteSummary::default();
    for request in &plan.requests {
        summary.add_request(request);
    }

    facts.record_applied(name, &projected)?;
    let after = facts.fetch(name)?;
    info!(
        "{name}: applied {} patch(es), {} delete(s)",
        summary.patched, summary.deleted
    );

    Ok(Outcome {
        changed: true,
        commands: plan.commands,
        requests: plan.requests,
        before,
        after,
        projected,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticFacts;
    use crate::error::Error;
    use crate::keyspec::KeySpec;
    use crate::testing::TestSchema;
    use crate::types::{Method, State};
    use serde_json::json;
    use std::cell::RefCell;

    /// Records sent requests, failing on the nth one if asked to
    #[derive(Default)]
    struct RecordingTransport {
        sent: RefCell<Vec<Request>>,
        fail_at: Option<usize>,
    }

    impl Transport for RecordingTransport {
        fn send(&self, request: &Request) -> Result<()> {
            if self.fail_at == Some(self.sent.borrow().len()) {
                return Err(Error::transport("device rejected payload", Some(400)));
            }
            self.sent.borrow_mut().push(request.clone());
            Ok(())
        }
    }

    /// Facts that remember what was recorded as applied
    struct MemoryFacts {
        tree: RefCell<ConfigTree>,
    }

    impl Facts for MemoryFacts {
        fn fetch(&self, _resource: &str) -> Result<ConfigTree> {
            Ok(self.tree.borrow().clone())
        }

        fn record_applied(&self, _resource: &str, tree: &ConfigTree) -> Result<()> {
            *self.tree.borrow_mut() = tree.clone();
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingProgress {
        started: usize,
        completed: Vec<bool>,
        batches: usize,
    }

    impl ProgressCallback for CountingProgress {
        fn on_batch_start(&mut self, _count: usize) {
            self.batches += 1;
        }
        fn on_request_start(&mut self, _request: &Request) {
            self.started += 1;
        }
        fn on_request_complete(&mut self, _request: &Request, ok: bool) {
            self.completed.push(ok);
        }
        fn on_batch_complete(&mut self) {}
    }

    fn schema() -> TestSchema {
        TestSchema::new(KeySpec::new().list("interfaces", ["name"]))
    }

    fn options(state: State, check_mode: bool) -> ExecuteOptions {
        ExecuteOptions { state, check_mode }
    }

    #[test]
    fn test_check_mode_never_sends() {
        let facts = StaticFacts::new().with("test", json!({"enabled": false}));
        let transport = RecordingTransport::default();
        let want = json!({"enabled": true});

        let outcome = run_simple(
            &schema(),
            options(State::Merged, true),
            Some(&want),
            &facts,
            &transport,
        )
        .unwrap();

        assert!(outcome.changed);
        assert!(transport.sent.borrow().is_empty());
        assert_eq!(outcome.after, json!({"enabled": true}));
        assert_eq!(outcome.after, outcome.projected);
        assert_eq!(outcome.summary.total(), 0);
    }

    #[test]
    fn test_apply_sends_requests_and_refetches() {
        let facts = MemoryFacts {
            tree: RefCell::new(json!({"interfaces": [{"name": "Eth1", "mtu": 1500}]})),
        };
        let transport = RecordingTransport::default();
        let mut progress = CountingProgress::default();
        let want = json!({"interfaces": [{"name": "Eth2", "mtu": 9100}]});

        let outcome = run(
            &schema(),
            options(State::Overridden, false),
            Some(&want),
            &facts,
            &transport,
            &mut progress,
        )
        .unwrap();

        let methods: Vec<Method> = transport.sent.borrow().iter().map(|r| r.method).collect();
        assert_eq!(methods, vec![Method::Delete, Method::Patch]);
        assert_eq!(outcome.summary, ExecuteSummary { patched: 1, deleted: 1 });
        assert_eq!(outcome.after, want);
        assert_eq!(progress.started, 2);
        assert_eq!(progress.completed, vec![true, true]);
        assert_eq!(progress.batches, 1);
    }

    #[test]
    fn test_no_change_sends_nothing() {
        let facts = StaticFacts::new().with("test", json!({"enabled": true}));
        let transport = RecordingTransport::default();
        let mut progress = CountingProgress::default();
        let want = json!({"enabled": true});

        let outcome = run(
            &schema(),
            options(State::Merged, false),
            Some(&want),
            &facts,
            &transport,
            &mut progress,
        )
        .unwrap();

        assert!(!outcome.changed);
        assert!(outcome.commands.is_empty());
        assert_eq!(outcome.before, outcome.after);
        assert_eq!(progress.batches, 0);
    }

    #[test]
    fn test_transport_failure_aborts_remaining_requests() {
        let facts = StaticFacts::new().with(
            "test",
            json!({"interfaces": [{"name": "Eth1"}, {"name": "Eth2"}, {"name": "Eth3"}]}),
        );
        let transport = RecordingTransport {
            fail_at: Some(1),
            ..RecordingTransport::default()
        };
        let mut progress = CountingProgress::default();

        let err = run(
            &schema(),
            options(State::Deleted, false),
            None,
            &facts,
            &transport,
            &mut progress,
        )
        .unwrap_err();

        assert_eq!(err.code(), Some(400));
        assert_eq!(transport.sent.borrow().len(), 1);
        assert_eq!(progress.completed, vec![true, false]);
    }

    /// Accepts whole batches only
    #[derive(Default)]
    struct BatchTransport {
        batches: RefCell<Vec<Vec<Request>>>,
    }

    impl Transport for BatchTransport {
        fn send(&self, _request: &Request) -> Result<()> {
            Err(Error::transport("single requests are not accepted", None))
        }

        fn submit(&self, requests: &[Request]) -> Result<()> {
            self.batches.borrow_mut().push(requests.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_run_simple_submits_one_batch() {
        let facts = MemoryFacts {
            tree: RefCell::new(json!({"interfaces": [{"name": "Eth1", "mtu": 1500}]})),
        };
        let transport = BatchTransport::default();
        let want = json!({"interfaces": [{"name": "Eth2", "mtu": 9100}]});

        let outcome = run_simple(
            &schema(),
            options(State::Overridden, false),
            Some(&want),
            &facts,
            &transport,
        )
        .unwrap();

        let batches = transport.batches.borrow();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], outcome.requests);
        assert_eq!(outcome.summary, ExecuteSummary { patched: 1, deleted: 1 });
        assert_eq!(outcome.after, want);
    }

    #[test]
    fn test_default_submit_stops_at_first_failure() {
        let facts = StaticFacts::new().with(
            "test",
            json!({"interfaces": [{"name": "Eth1"}, {"name": "Eth2"}]}),
        );
        let transport = RecordingTransport {
            fail_at: Some(1),
            ..RecordingTransport::default()
        };

        let err = run_simple(&schema(), options(State::Deleted, false), None, &facts, &transport)
            .unwrap_err();

        assert!(matches!(err, Error::Transport { .. }));
        assert_eq!(transport.sent.borrow().len(), 1);
    }

    #[test]
    fn test_validation_failure_sends_nothing() {
        let schema = TestSchema::new(KeySpec::new()).rejecting("mtu");
        let facts = StaticFacts::new();
        let transport = RecordingTransport::default();
        let want = json!({"mtu": 1});

        let err = run_simple(&schema, options(State::Merged, false), Some(&want), &facts, &transport)
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(transport.sent.borrow().is_empty());
    }
}
