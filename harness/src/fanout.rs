/*!

Fan-out: one task per target, all joined before anything is inspected.

Every unit runs to completion regardless of its siblings. Results are re-associated with the
target name that produced them, so callers never depend on completion or submission order.

!*/

use crate::error::{self, CommandFailure, Result};
use crate::process::{CommandRunner, CommandSpec, ProcessResult};
use futures::future::join_all;
use log::debug;
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Runs every `(name, command)` pair concurrently on its own task and waits for all of them.
///
/// If any unit could not be spawned (or its task died) the first such error is returned, but only
/// after every sibling has finished.
pub async fn fan_out<R>(
    runner: &Arc<R>,
    commands: Vec<(String, CommandSpec)>,
) -> Result<BTreeMap<String, ProcessResult>>
where
    R: CommandRunner + 'static,
{
    let handles: Vec<_> = commands
        .into_iter()
        .map(|(name, command)| {
            debug!("Starting task for '{}'", name);
            let runner = Arc::clone(runner);
            let handle = tokio::spawn(async move { runner.run(&command).await });
            (name, handle)
        })
        .collect();

    let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let joined = join_all(handles).await;

    let mut results = BTreeMap::new();
    let mut first_error = None;
    for (name, outcome) in names.into_iter().zip(joined) {
        match outcome.context(error::JoinSnafu { name: &name }) {
            Ok(Ok(result)) => {
                results.insert(name, result);
            }
            Ok(Err(e)) | Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(results),
    }
}

/// Collects every failed result into a single aggregate error.
pub fn ensure_all_succeeded<'a, I>(action: &str, results: I) -> Result<()>
where
    I: IntoIterator<Item = &'a ProcessResult>,
{
    let failures: Vec<CommandFailure> = results
        .into_iter()
        .filter(|result| !result.succeeded())
        .map(CommandFailure::from)
        .collect();
    ensure!(
        failures.is_empty(),
        error::AggregateSnafu { action, failures }
    );
    Ok(())
}
