//! State-intent dispatcher
//!
//! Turns (state, want, have) into an ordered list of commands, then compiles
//! them to requests through the resource schema. Every per-invocation flag
//! travels as a parameter; the dispatcher holds no state between calls.
//!
//! | State        | Deletes                                  | Pushes                    |
//! |--------------|------------------------------------------|---------------------------|
//! | `merged`     | never                                    | `diff(want, have)`        |
//! | `replaced`   | conflicting parts of matched instances   | what is still missing     |
//! | `overridden` | every have instance that differs         | all of want               |
//! | `deleted`    | what want names, or everything           | never                     |
//!
//! A keyed entry carrying only its identity reads differently per path:
//! `deleted` removes the whole entry, `replaced` and `overridden` keep the
//! matched have instance as it is.

use crate::diff::{common, diff, diff_map, keep_bare, normalize_lists, whole, with_identity};
use crate::error::Result;
use crate::keyspec::{FieldSpec, KeySpec};
use crate::matcher::match_entries;
use crate::projection::project;
use crate::resource::ResourceSchema;
use crate::tree::{identity_only, is_empty_tree, join, normalize_root, prune_nulls};
use crate::types::{Command, ConfigTree, Plan, Request, State};
use log::{debug, warn};
use serde_json::{Map, Value};

/// Outcome of comparing one want instance with its have counterpart
enum Replacement {
    /// Reconcile in place; the map holds entries of mergeable fields to remove
    Merge(Map<String, Value>),
    /// Remove the whole have instance, then push the want instance
    Overwrite,
}

/// Generic dispatcher over one resource schema
pub struct StateDispatcher<'a, S: ResourceSchema + ?Sized> {
    schema: &'a S,
}

impl<'a, S: ResourceSchema + ?Sized> StateDispatcher<'a, S> {
    pub fn new(schema: &'a S) -> Self {
        Self { schema }
    }

    /// Compute the plan that reconciles `have` toward `want` under `state`
    ///
    /// `want` of `None`, null or an empty mapping all mean "nothing given",
    /// which for `deleted` and `overridden` removes everything.
    pub fn dispatch(
        &self,
        state: State,
        want: Option<&ConfigTree>,
        have: &ConfigTree,
    ) -> Result<Plan> {
        let spec = self.schema.key_spec();
        let have = normalize_lists(&normalize_root(have)?, spec);
        let want = want
            .map(|w| normalize_root(w).map(|w| normalize_lists(&w, spec)))
            .transpose()?
            .filter(|w| !is_empty_tree(w));

        if let Some(want) = &want {
            self.schema.validate(want)?;
        }

        debug!(
            "{}: dispatching {state} (want {})",
            self.schema.name(),
            if want.is_some() { "given" } else { "empty" }
        );

        let commands = match state {
            State::Merged => self.merged(want.as_ref(), &have)?,
            State::Replaced => self.replaced(want.as_ref(), &have)?,
            State::Overridden => self.overridden(want.as_ref(), &have)?,
            State::Deleted => self.deleted(want.as_ref(), &have)?,
        };
        self.compile(commands, &have)
    }

    fn merged(&self, want: Option<&ConfigTree>, have: &ConfigTree) -> Result<Vec<Command>> {
        let Some(want) = want else {
            return Ok(Vec::new());
        };
        let push = diff(want, &self.filled(have), self.schema.key_spec())?;
        Ok(command(State::Merged, push).into_iter().collect())
    }

    fn deleted(&self, want: Option<&ConfigTree>, have: &ConfigTree) -> Result<Vec<Command>> {
        let stripped = self.stripped(have);
        let Some(want) = want else {
            return Ok(delete_everything(stripped));
        };
        let named = common(want, &stripped, self.schema.key_spec())?;
        Ok(command(State::Deleted, named).into_iter().collect())
    }

    fn overridden(&self, want: Option<&ConfigTree>, have: &ConfigTree) -> Result<Vec<Command>> {
        let spec = self.schema.key_spec();
        let stripped = self.stripped(have);
        let Some(want) = want else {
            return Ok(delete_everything(stripped));
        };
        let want = &keep_bare(want, &stripped, spec)?;

        let extra = diff(&stripped, want, spec)?;
        if is_empty_tree(&extra) {
            let push = diff(want, &self.filled(have), spec)?;
            return Ok(command(State::Overridden, push).into_iter().collect());
        }

        let script: Map<String, Value> = match &extra {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), whole(v, spec.get(k))))
                .collect(),
            _ => Map::new(),
        };
        debug!(
            "{}: overridden removes {} differing field(s), then pushes all of want",
            self.schema.name(),
            script.len()
        );
        Ok(vec![
            Command::new(State::Deleted, Value::Object(script)),
            Command::new(State::Overridden, prune_nulls(want)),
        ])
    }

    fn replaced(&self, want: Option<&ConfigTree>, have: &ConfigTree) -> Result<Vec<Command>> {
        let Some(want) = want else {
            return Ok(Vec::new());
        };
        let spec = self.schema.key_spec();
        let stripped = self.stripped(have);
        let want = &keep_bare(want, &stripped, spec)?;
        let empty = Map::new();
        let want_map = want.as_object().unwrap_or(&empty);
        let have_map = stripped.as_object().unwrap_or(&empty);

        let delete = match self.schema.instance_field() {
            None => match self.replace_instance("", want_map, have_map, spec, &[])? {
                Replacement::Overwrite => delete_everything(stripped.clone()).into_iter().next(),
                Replacement::Merge(script) => command(State::Deleted, Value::Object(script)),
            },
            Some(name) => self.replace_instances(name, want_map, have_map, spec.get(name))?,
        };

        let mut commands: Vec<Command> = delete.into_iter().collect();
        let remaining = project(self.schema, have, &commands)?;
        let push = diff(want, &self.filled(&remaining), spec)?;
        commands.extend(command(State::Replaced, push));
        Ok(commands)
    }

    fn replace_instances(
        &self,
        name: &str,
        want: &Map<String, Value>,
        have: &Map<String, Value>,
        field: &FieldSpec,
    ) -> Result<Option<Command>> {
        let identity = field.identity();
        let mut script = Vec::new();

        for m in match_entries(name, entries(want, name), entries(have, name), identity)? {
            let (Some(Value::Object(w)), Some(Value::Object(h))) = (m.left, m.right) else {
                continue;
            };
            match self.replace_instance(name, w, h, field.nested(), identity)? {
                Replacement::Overwrite => {
                    debug!("{}: replacing instance ({})", self.schema.name(), m.key);
                    script.push(Value::Object(identity_only(h, identity)));
                }
                Replacement::Merge(changes) if !changes.is_empty() => {
                    script.push(Value::Object(with_identity(h, identity, changes)));
                }
                Replacement::Merge(_) => {}
            }
        }

        if script.is_empty() {
            return Ok(None);
        }
        let mut tree = Map::new();
        tree.insert(name.to_string(), Value::Array(script));
        Ok(Some(Command::new(State::Deleted, Value::Object(tree))))
    }

    /// Decide how one matched instance is replaced
    ///
    /// Fields in the mergeable allow-list are reconciled entry by entry.
    /// Scalars that want sets to another value are overwritten in place.
    /// Anything else have carries that want does not forces an overwrite.
    fn replace_instance(
        &self,
        path: &str,
        want: &Map<String, Value>,
        have: &Map<String, Value>,
        spec: &KeySpec,
        identity: &[String],
    ) -> Result<Replacement> {
        let extra = diff_map(path, have, want, spec)?;
        let mergeable = self.schema.mergeable_fields();
        let mut script = Map::new();

        for (k, v) in &extra {
            if identity.iter().any(|id| id == k) {
                continue;
            }
            if mergeable.contains(&k.as_str()) {
                script.insert(k.clone(), removals(v, spec.get(k)));
                continue;
            }
            let set_in_want = want.get(k).is_some_and(|w| !w.is_null());
            if v.is_object() || v.is_array() || !set_in_want {
                debug!(
                    "{}: '{}' conflicts, overwriting the instance",
                    self.schema.name(),
                    join(path, k)
                );
                return Ok(Replacement::Overwrite);
            }
        }
        Ok(Replacement::Merge(script))
    }

    /// Compile commands, deletes first, dropping any without device impact
    fn compile(&self, commands: Vec<Command>, have: &ConfigTree) -> Result<Plan> {
        let (deletes, pushes): (Vec<Command>, Vec<Command>) =
            commands.into_iter().partition(Command::is_delete);

        let mut plan = Plan::default();
        for command in deletes.into_iter().chain(pushes) {
            let requests = self.requests_for(&command, have)?;
            if requests.is_empty() {
                warn!(
                    "{}: dropping {} command that compiles to no requests",
                    self.schema.name(),
                    command.state
                );
                continue;
            }
            debug!(
                "{}: {} command compiled to {} request(s)",
                self.schema.name(),
                command.state,
                requests.len()
            );
            plan.requests.extend(requests);
            plan.commands.push(command);
        }
        Ok(plan)
    }

    fn requests_for(&self, command: &Command, have: &ConfigTree) -> Result<Vec<Request>> {
        if command.delete_all
            && let Some(path) = self.schema.root_delete_path()
        {
            return Ok(vec![Request::delete(path)]);
        }
        self.schema.compile(command, have)
    }

    fn filled(&self, have: &ConfigTree) -> ConfigTree {
        self.schema.defaults().fill(have, self.schema.key_spec())
    }

    fn stripped(&self, have: &ConfigTree) -> ConfigTree {
        self.schema.defaults().strip(have, self.schema.key_spec())
    }
}

fn command(state: State, tree: ConfigTree) -> Option<Command> {
    (!is_empty_tree(&tree)).then(|| Command::new(state, tree))
}

fn delete_everything(have: ConfigTree) -> Vec<Command> {
    if is_empty_tree(&have) {
        return Vec::new();
    }
    vec![Command::delete_all(have)]
}

fn entries<'m>(map: &'m Map<String, Value>, name: &str) -> &'m [Value] {
    match map.get(name) {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// Rewrite extra have content into a script removing whole entries
///
/// Unlike [`whole`], sections are walked rather than removed outright.
fn removals(value: &Value, field: &FieldSpec) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), removals(v, field.nested().get(k))))
                .collect(),
        ),
        other => whole(other, field),
    }
}
