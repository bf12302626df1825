/// Instrumentation Wrapper
///
/// Measures one invocation: wall-clock time between just before and just after
/// the call, truncated to whole milliseconds, and the process-wide live-heap
/// delta over the same window.
///
/// The heap delta is a snapshot difference, not a per-call attribution. Anything
/// else allocating in the process at the same time shows up in it, and it can be
/// negative when the call frees more than it allocates.

use crate::alloc::heap_in_use;
use std::time::Instant;

/// A value together with the cost of producing it
#[derive(Debug, Clone, PartialEq)]
pub struct Measured<T> {
    pub value: T,
    pub elapsed_ms: u64,
    pub memory_delta_bytes: i64,
}

impl<T, E> Measured<Result<T, E>> {
    /// Move the fault out; the measurement is kept only on success
    pub fn transpose(self) -> Result<Measured<T>, E> {
        let Measured {
            value,
            elapsed_ms,
            memory_delta_bytes,
        } = self;
        value.map(|value| Measured {
            value,
            elapsed_ms,
            memory_delta_bytes,
        })
    }
}

/// Run `call` and measure it. The call's result, fault included, is returned untouched.
pub fn measure<T, F>(call: F) -> Measured<T>
where
    F: FnOnce() -> T,
{
    let heap_before = heap_in_use();
    let start = Instant::now();

    let value = call();

    let elapsed = start.elapsed();
    let heap_after = heap_in_use();

    Measured {
        value,
        elapsed_ms: elapsed.as_millis() as u64,
        memory_delta_bytes: heap_after as i64 - heap_before as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_elapsed_is_whole_milliseconds() {
        let measured = measure(|| std::thread::sleep(Duration::from_millis(25)));
        assert!(measured.elapsed_ms >= 25, "{}", measured.elapsed_ms);
    }

    #[test]
    fn test_sub_millisecond_call_reports_zero() {
        let measured = measure(|| 1 + 1);
        assert_eq!(measured.value, 2);
        assert_eq!(measured.elapsed_ms, 0);
    }

    #[test]
    fn test_fault_propagates_unchanged() {
        let measured = measure(|| Err::<u32, _>("boom"));
        assert_eq!(measured.clone().transpose(), Err("boom"));
        assert_eq!(measured.value, Err("boom"));
    }

    #[test]
    fn test_transpose_keeps_measurement() {
        let measured = Measured {
            value: Ok::<_, String>(5),
            elapsed_ms: 7,
            memory_delta_bytes: -12,
        };
        let ok = measured.transpose().unwrap();
        assert_eq!(ok.value, 5);
        assert_eq!(ok.elapsed_ms, 7);
        assert_eq!(ok.memory_delta_bytes, -12);
    }

    #[test]
    fn test_retained_allocation_is_counted() {
        // The test binary installs TrackingAllocator; other test threads add noise,
        // so only a large retained block is asserted on.
        let measured = measure(|| vec![1u8; 16 * 1024 * 1024]);
        assert_eq!(measured.value.len(), 16 * 1024 * 1024);
        assert!(measured.memory_delta_bytes > 8 * 1024 * 1024, "{}", measured.memory_delta_bytes);
    }
}
