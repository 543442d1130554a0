use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indicatif::{HumanDuration, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

pub struct Progress {
    enabled: bool,
    start: Instant,

    // UI
    mp: Option<MultiProgress>,
    stage: ProgressBar,
    profiles: ProgressBar,
    posts: ProgressBar,

    // Counters
    posts_done: AtomicU64,
    posts_skipped: AtomicU64,
}

impl Progress {
    pub fn new(enabled: bool) -> Arc<Self> {
        let start = Instant::now();

        if !enabled {
            return Arc::new(Self::hidden(start));
        }

        let mp = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());

        let Ok(spinner_style) = ProgressStyle::with_template("{spinner} {msg}  [{elapsed_precise}]")
        else {
            return Arc::new(Self::hidden(start));
        };
        let Ok(bar_style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
        else {
            return Arc::new(Self::hidden(start));
        };
        let bar_style = bar_style.progress_chars("##-");

        let stage = mp.add(ProgressBar::new_spinner());
        stage.set_style(spinner_style);
        stage.enable_steady_tick(Duration::from_millis(80));
        stage.set_message("starting");

        let profiles = mp.add(ProgressBar::new(0));
        profiles.set_style(bar_style.clone());
        profiles.set_message("profiles");

        let posts = mp.add(ProgressBar::new(0));
        posts.set_style(bar_style);
        posts.set_message("posts");

        Arc::new(Self {
            enabled: true,
            start,
            mp: Some(mp),
            stage,
            profiles,
            posts,
            posts_done: AtomicU64::new(0),
            posts_skipped: AtomicU64::new(0),
        })
    }

    fn hidden(start: Instant) -> Self {
        Self {
            enabled: false,
            start,
            mp: None,
            stage: ProgressBar::hidden(),
            profiles: ProgressBar::hidden(),
            posts: ProgressBar::hidden(),
            posts_done: AtomicU64::new(0),
            posts_skipped: AtomicU64::new(0),
        }
    }

    pub fn set_stage(&self, msg: impl Into<String>) {
        if !self.enabled {
            return;
        }
        self.stage.set_message(msg.into());
    }

    pub fn set_profiles_total(&self, total: usize) {
        if self.enabled {
            self.profiles.set_length(total as u64);
        }
    }

    pub fn profile_started(&self, handle: &str) {
        if !self.enabled {
            return;
        }
        self.profiles.set_message(format!("@{handle}"));
        self.posts.reset();
        self.posts.set_length(0);
    }

    pub fn profile_done(&self) {
        if self.enabled {
            self.profiles.inc(1);
        }
    }

    pub fn set_posts_total(&self, total: usize) {
        if self.enabled {
            self.posts.set_length(total as u64);
        }
    }

    pub fn post_done(&self, post_url: &str, skipped: bool) {
        if skipped {
            self.posts_skipped.fetch_add(1, Ordering::Relaxed);
        } else {
            self.posts_done.fetch_add(1, Ordering::Relaxed);
        }
        if self.enabled {
            self.posts.inc(1);
            self.posts.set_message(post_url.to_string());
        }
    }

    pub fn finish(&self) {
        let done = self.posts_done.load(Ordering::Relaxed);
        let skipped = self.posts_skipped.load(Ordering::Relaxed);
        tracing::debug!(posts = done, skipped, "crawl counters");

        if !self.enabled {
            return;
        }
        self.stage.finish_with_message("done");
        self.profiles.finish_and_clear();
        self.posts.finish_and_clear();
        if let Some(mp) = &self.mp {
            // Best effort: ensure the last render flushes.
            let _ = mp.println(format!(
                "{done} posts ({skipped} skipped) in {}",
                HumanDuration(self.start.elapsed())
            ));
        }
    }
}
