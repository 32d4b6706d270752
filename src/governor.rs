// Copyright 2025 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Resource Governor (§4.8): samples process CPU/RSS, throttles workers, and
//! is the single choke point (`wait_if_throttled`) that makes UI activity pause
//! indexing and over-budget CPU/RSS slow it down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ResourceConfig;
use crate::constants::GOVERNOR_SAMPLE_INTERVAL_SECS;

#[derive(Debug, Clone, Copy)]
pub struct GovernorStats {
	pub cpu_percent: f32,
	pub rss_mb: u64,
	pub throttled: bool,
	pub ui_active: bool,
}

/// Samples `/proc/self/stat` and `/proc/self/statm` on Linux for a zero-dependency
/// CPU/RSS reading; on other platforms reports zero, which simply never triggers
/// throttling (the governor degrades to a no-op limiter rather than failing).
fn sample_usage() -> (f32, u64) {
	#[cfg(target_os = "linux")]
	{
		let rss_mb = std::fs::read_to_string("/proc/self/statm")
			.ok()
			.and_then(|s| s.split_whitespace().nth(1).map(|p| p.to_string()))
			.and_then(|pages| pages.parse::<u64>().ok())
			.map(|pages| pages * (page_size_kb()) / 1024)
			.unwrap_or(0);
		// CPU percent sampling needs two readings over time; the background loop
		// below does that by diffing successive `utime+stime` jiffies.
		(0.0, rss_mb)
	}
	#[cfg(not(target_os = "linux"))]
	{
		(0.0, 0)
	}
}

#[cfg(target_os = "linux")]
fn page_size_kb() -> u64 {
	4 // standard 4KiB pages; avoids a libc dependency for sysconf(_SC_PAGESIZE)
}

#[cfg(target_os = "linux")]
fn read_cpu_jiffies() -> Option<u64> {
	let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
	let after_comm = stat.rsplit_once(") ")?.1;
	let fields: Vec<&str> = after_comm.split_whitespace().collect();
	// utime is field 14 (index 11 after the comm), stime is field 15 (index 12).
	let utime: u64 = fields.get(11)?.parse().ok()?;
	let stime: u64 = fields.get(12)?.parse().ok()?;
	Some(utime + stime)
}

/// Resource-usage sampler + cooperative throttle. Cheap to clone (internally Arc'd).
pub struct ResourceGovernor {
	max_cpu_percent: f32,
	max_memory_mb: u64,
	max_workers: Option<usize>,
	cpu_percent: Arc<AtomicU64>, // stored as percent * 100 (fixed point)
	rss_mb: Arc<AtomicU64>,
	ui_active: Arc<AtomicBool>,
	running: Arc<AtomicBool>,
}

impl ResourceGovernor {
	pub fn new(config: &ResourceConfig) -> Arc<Self> {
		Arc::new(Self {
			max_cpu_percent: config.max_cpu_percent,
			max_memory_mb: config.max_memory_mb,
			max_workers: config.max_workers,
			cpu_percent: Arc::new(AtomicU64::new(0)),
			rss_mb: Arc::new(AtomicU64::new(0)),
			ui_active: Arc::new(AtomicBool::new(false)),
			running: Arc::new(AtomicBool::new(false)),
		})
	}

	/// Spawn the background sampling loop. Returns the join handle; call
	/// `stop()` to end it.
	pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
		let this = Arc::clone(self);
		this.running.store(true, Ordering::SeqCst);
		tokio::spawn(async move {
			#[cfg(target_os = "linux")]
			let mut last_jiffies = read_cpu_jiffies();
			#[cfg(target_os = "linux")]
			let clock_ticks_per_sec: u64 = 100;

			let mut interval = tokio::time::interval(Duration::from_secs(GOVERNOR_SAMPLE_INTERVAL_SECS));
			while this.running.load(Ordering::SeqCst) {
				interval.tick().await;
				let (_, rss_mb) = sample_usage();
				this.rss_mb.store(rss_mb, Ordering::Relaxed);

				#[cfg(target_os = "linux")]
				{
					if let Some(jiffies) = read_cpu_jiffies() {
						if let Some(prev) = last_jiffies {
							let delta_jiffies = jiffies.saturating_sub(prev);
							let delta_secs = GOVERNOR_SAMPLE_INTERVAL_SECS as f64;
							let cpu_pct = (delta_jiffies as f64 / clock_ticks_per_sec as f64 / delta_secs) * 100.0;
							this.cpu_percent.store((cpu_pct * 100.0) as u64, Ordering::Relaxed);
						}
						last_jiffies = Some(jiffies);
					}
				}
			}
		})
	}

	pub fn stop(&self) {
		self.running.store(false, Ordering::SeqCst);
	}

	pub fn set_ui_active(&self, active: bool) {
		self.ui_active.store(active, Ordering::SeqCst);
	}

	pub fn is_ui_active(&self) -> bool {
		self.ui_active.load(Ordering::SeqCst)
	}

	fn cpu_percent(&self) -> f32 {
		self.cpu_percent.load(Ordering::Relaxed) as f32 / 100.0
	}

	fn rss_mb(&self) -> u64 {
		self.rss_mb.load(Ordering::Relaxed)
	}

	pub fn should_throttle(&self) -> bool {
		self.cpu_percent() > self.max_cpu_percent || self.rss_mb() > self.max_memory_mb
	}

	pub fn get_optimal_worker_count(&self) -> usize {
		if let Some(n) = self.max_workers {
			return n.max(1);
		}
		let physical = num_cpus::get_physical();
		(physical / 2).clamp(1, 4)
	}

	/// Yield cooperatively: 0ms when idle, 100ms when UI is active but within
	/// budget, 500ms when over CPU or memory budget. Never blocks indefinitely.
	pub async fn wait_if_throttled(&self) {
		let millis = if self.should_throttle() {
			crate::constants::MAX_YIELD_MS
		} else if self.is_ui_active() {
			100
		} else {
			0
		};

		if millis == 0 {
			tokio::task::yield_now().await;
		} else {
			tokio::time::sleep(Duration::from_millis(millis)).await;
		}
	}

	pub fn get_stats(&self) -> GovernorStats {
		GovernorStats {
			cpu_percent: self.cpu_percent(),
			rss_mb: self.rss_mb(),
			throttled: self.should_throttle(),
			ui_active: self.is_ui_active(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cfg() -> ResourceConfig {
		ResourceConfig {
			max_cpu_percent: 80.0,
			max_memory_mb: 2048,
			max_workers: Some(3),
			idle_timeout_seconds: 300,
			debounce_delay_ms: 500,
		}
	}

	#[test]
	fn optimal_worker_count_respects_explicit_override() {
		let gov = ResourceGovernor::new(&cfg());
		assert_eq!(gov.get_optimal_worker_count(), 3);
	}

	#[test]
	fn optimal_worker_count_defaults_within_one_and_four() {
		let mut c = cfg();
		c.max_workers = None;
		let gov = ResourceGovernor::new(&c);
		let n = gov.get_optimal_worker_count();
        assert!((1..=4).contains(&n));
	}

	#[test]
	fn ui_active_flag_round_trips() {
		let gov = ResourceGovernor::new(&cfg());
		assert!(!gov.is_ui_active());
		gov.set_ui_active(true);
		assert!(gov.is_ui_active());
	}

	#[tokio::test]
	async fn wait_if_throttled_never_blocks_indefinitely() {
		let gov = ResourceGovernor::new(&cfg());
		let start = std::time::Instant::now();
		gov.wait_if_throttled().await;
		assert!(start.elapsed() < Duration::from_millis(600));
	}
}
