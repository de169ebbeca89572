#![forbid(unsafe_code)]

//! The scripted walkthrough.
//!
//! | Step | Action | Expected deliveries |
//! |------|--------|---------------------|
//! | 1 | main screen subscribes to `greeting`, publish "hello" | main |
//! | 2 | second screen subscribes sticky + plain, becomes live | sticky replays "hello" |
//! | 3 | publish "todo", then `publish_async("todo-async")` | all three, twice |
//! | 4 | worker thread floods `progress` | one delivery, last value |
//! | 5 | second screen destroyed | its subscriptions removed |

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use livebus_core::{ContextError, LifecycleRegistry, LivenessState, LoopExecutor};
use livebus_runtime::{BusConfig, BusError, BusHub, SubscriberId, Version};
use tracing::info;

/// Failure while running the walkthrough.
#[derive(Debug)]
pub enum WalkthroughError {
    /// A bus operation was rejected.
    Bus(BusError),
    /// The executor was driven off its owning thread.
    Context(ContextError),
    /// The background publisher panicked.
    WorkerPanicked,
}

impl fmt::Display for WalkthroughError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(err) => write!(f, "bus error: {err}"),
            Self::Context(err) => write!(f, "executor error: {err}"),
            Self::WorkerPanicked => f.write_str("background publisher panicked"),
        }
    }
}

impl std::error::Error for WalkthroughError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bus(err) => Some(err),
            Self::Context(err) => Some(err),
            Self::WorkerPanicked => None,
        }
    }
}

impl From<BusError> for WalkthroughError {
    fn from(err: BusError) -> Self {
        Self::Bus(err)
    }
}

impl From<ContextError> for WalkthroughError {
    fn from(err: ContextError) -> Self {
        Self::Context(err)
    }
}

/// Delivery lines in the order subscribers saw them.
#[derive(Debug, Clone, Default)]
struct Transcript {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Transcript {
    fn sink<T: fmt::Display + 'static>(
        &self,
        label: &'static str,
    ) -> impl Fn(&T) + Send + Sync + 'static {
        let lines = Arc::clone(&self.lines);
        move |value: &T| {
            info!(subscriber = label, %value, "delivered");
            lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(format!("{label}: {value}"));
        }
    }

    fn into_lines(self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Outcome of a walkthrough run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Every delivery, as `subscriber: value`.
    pub lines: Vec<String>,
    /// Final version of the `greeting` channel.
    pub greeting_version: Version,
    /// Final version of the `progress` channel.
    pub progress_version: Version,
    /// Subscribers left on `greeting` after the second screen is destroyed.
    pub greeting_subscribers: usize,
}

/// Run every step on the calling thread, which becomes the owning context.
pub fn run(config: BusConfig, async_posts: u32) -> Result<Summary, WalkthroughError> {
    let executor = Arc::new(LoopExecutor::for_current_thread());
    let hub = BusHub::with_config(executor.clone(), config);
    let transcript = Transcript::default();

    // Step 1
    let main_screen = Arc::new(LifecycleRegistry::new());
    main_screen.move_to(LivenessState::Created);
    let greeting = hub.channel::<String>("greeting")?;
    greeting.subscribe(SubscriberId::next(), main_screen.clone(), transcript.sink("main"))?;
    main_screen.move_to(LivenessState::Resumed);
    greeting.publish("hello".to_owned())?;

    // Step 2
    let second_screen = Arc::new(LifecycleRegistry::new());
    greeting.subscribe_sticky(
        SubscriberId::next(),
        second_screen.clone(),
        transcript.sink("second/sticky"),
    )?;
    greeting.subscribe(
        SubscriberId::next(),
        second_screen.clone(),
        transcript.sink("second/plain"),
    )?;
    second_screen.move_to(LivenessState::Created);
    second_screen.move_to(LivenessState::Resumed);

    // Step 3
    greeting.publish("todo".to_owned())?;
    greeting.publish_async("todo-async".to_owned());
    executor.run_pending()?;

    // Step 4
    let progress = hub.channel::<u32>("progress")?;
    progress.subscribe_forever(SubscriberId::next(), false, transcript.sink("progress"))?;
    let worker = {
        let progress = progress.clone();
        thread::spawn(move || {
            let scheduled = (1..=async_posts)
                .filter(|&n| progress.publish_async(n))
                .count();
            info!(async_posts, scheduled, "background publisher finished");
        })
    };
    worker.join().map_err(|_| WalkthroughError::WorkerPanicked)?;
    executor.run_pending()?;

    // Step 5
    second_screen.move_to(LivenessState::Destroyed);

    Ok(Summary {
        greeting_version: greeting.version(),
        progress_version: progress.version(),
        greeting_subscribers: greeting.subscriber_count(),
        lines: transcript.into_lines(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walkthrough_transcript() {
        livebus_harness::init_test_logging();
        let summary = run(BusConfig::default(), 50).unwrap();
        assert_eq!(
            summary.lines,
            vec![
                "main: hello",
                "second/sticky: hello",
                "main: todo",
                "second/sticky: todo",
                "second/plain: todo",
                "main: todo-async",
                "second/sticky: todo-async",
                "second/plain: todo-async",
                "progress: 50",
            ]
        );
        assert_eq!(summary.greeting_version.get(), 2);
        assert_eq!(summary.progress_version, Version::FIRST);
        assert_eq!(summary.greeting_subscribers, 1);
    }

    #[test]
    fn started_threshold_delays_sticky_replay() {
        let config = BusConfig::default().with_activation_threshold(LivenessState::Started);
        let summary = run(config, 0).unwrap();
        // Replay now happens at Resumed instead of Created; order is unchanged.
        assert_eq!(summary.lines[1], "second/sticky: hello");
        assert_eq!(summary.progress_version, Version::START);
        assert!(!summary.lines.iter().any(|l| l.starts_with("progress")));
    }
}
