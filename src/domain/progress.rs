// ==========================================
// 教会行政数据交换系统 - 进度回调与取消令牌
// ==========================================
// 进度回调在调用方线程同步执行，调用方需保证其足够快
// 取消令牌至少在批次之间、工作表之间、备份类型之间检查
// ==========================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 进度回调: (百分比 0-100, 消息)
pub type ProgressCallback = Arc<dyn Fn(u8, &str) + Send + Sync>;

/// 进度上报器，可切分为子区间供嵌套阶段使用
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start: f64,
    end: f64,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("has_callback", &self.callback.is_some())
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::silent()
    }
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            start: 0.0,
            end: 100.0,
        }
    }

    pub fn silent() -> Self {
        Self::new(None)
    }

    /// 上报本区间内的进度（0-100 映射到 [start, end]）
    pub fn report(&self, percent: u8, message: &str) {
        let local = f64::from(percent.min(100));
        let global = self.start + (self.end - self.start) * local / 100.0;
        let global = global.round().clamp(0.0, 100.0) as u8;
        tracing::debug!(percent = global, detail = message, "进度");
        if let Some(cb) = &self.callback {
            cb(global, message);
        }
    }

    /// 取本区间的子区间 [from, to]（均为本区间内的百分比）
    pub fn scoped(&self, from: u8, to: u8) -> ProgressReporter {
        let span = self.end - self.start;
        let from = f64::from(from.min(100));
        let to = f64::from(to.min(100)).max(from);
        ProgressReporter {
            callback: self.callback.clone(),
            start: self.start + span * from / 100.0,
            end: self.start + span * to / 100.0,
        }
    }
}

/// 操作已取消或超出期限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "操作已取消或超时")
    }
}

impl std::error::Error for Cancelled {}

/// 取消令牌（共享标志 + 可选截止时间）
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带超时的令牌
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_scoped_progress_maps_into_parent_range() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = ProgressReporter::new(Some(Arc::new(move |p: u8, _m: &str| {
            sink.lock().unwrap().push(p);
        })));

        let sub = reporter.scoped(50, 100);
        sub.report(0, "a");
        sub.report(50, "b");
        sub.report(100, "c");

        assert_eq!(*seen.lock().unwrap(), vec![50, 75, 100]);
    }

    #[test]
    fn test_cancellation_token_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert_eq!(token.check(), Err(Cancelled));
    }

    #[test]
    fn test_deadline_expires() {
        let token = CancellationToken::with_timeout(Duration::from_millis(0));
        assert!(token.is_cancelled());
    }
}
