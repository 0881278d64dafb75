//! Chain-of-responsibility executor for an ordered list of helpers.
//!
//! Each helper is entered with freshly built arguments and a [`Next`]
//! continuation covering the helpers after it. A helper that never runs its
//! continuation short-circuits everything downstream; those helpers are simply
//! absent from the returned visited set.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use kiln_types::Result;

use crate::helper::RegisteredHelper;

/// Builds the arguments for one helper just before it is entered.
pub type ArgsFactory<A> = Arc<dyn Fn(&RegisteredHelper<A>) -> Result<A> + Send + Sync>;

/// Invoked exactly once for every helper that is entered.
pub type StepRecorder<A> = Arc<dyn Fn(&RegisteredHelper<A>) + Send + Sync>;

struct Chain<A> {
    order: Vec<RegisteredHelper<A>>,
    build_args: ArgsFactory<A>,
    on_step: StepRecorder<A>,
    visited: Mutex<HashSet<String>>,
}

impl<A: Send + 'static> Chain<A> {
    fn run_at(self: Arc<Self>, index: usize) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            let Some(entry) = self.order.get(index).cloned() else {
                return Ok(());
            };

            self.visited.lock().insert(entry.id.clone());
            (self.on_step)(&entry);
            tracing::debug!(
                helper = %entry.id,
                remaining = self.order.len() - index - 1,
                "Entering helper"
            );

            let args = (self.build_args)(&entry)?;
            let next = Next {
                chain: Arc::clone(&self),
                index: index + 1,
            };
            entry.helper.applier().apply(args, next).await
        })
    }
}

// ---------------------------------------------------------------------------
// Next: continuation over the remaining helpers
// ---------------------------------------------------------------------------

/// The rest of the chain after the current helper.
///
/// `run` consumes the continuation, so the downstream helpers can be started
/// at most once per entry.
pub struct Next<A> {
    chain: Arc<Chain<A>>,
    index: usize,
}

impl<A: Send + 'static> Next<A> {
    /// Run every remaining helper, in order, and resolve once they finish.
    pub fn run(self) -> BoxFuture<'static, Result<()>> {
        self.chain.run_at(self.index)
    }

    /// How many helpers this continuation would start.
    pub fn remaining(&self) -> usize {
        self.chain.order.len().saturating_sub(self.index)
    }
}

/// Walk `order` as a chain and return the ids of every helper that was entered.
pub async fn execute_helpers<A: Send + 'static>(
    order: Vec<RegisteredHelper<A>>,
    build_args: ArgsFactory<A>,
    on_step: StepRecorder<A>,
) -> Result<HashSet<String>> {
    let chain = Arc::new(Chain {
        order,
        build_args,
        on_step,
        visited: Mutex::new(HashSet::new()),
    });

    Arc::clone(&chain).run_at(0).await?;

    let visited = chain.visited.lock().clone();
    Ok(visited)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
