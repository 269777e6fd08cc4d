//! Optional work splitting for pure numeric inner loops.
//!
//! The engine has no thread pool of its own. What it offers is the classic
//! "drop the host's execution lock around a raw numeric loop" hook: when the
//! `parallel` feature is enabled, long contiguous loops over plain numeric
//! memory are split recursively across rayon's pool. Loops that can call
//! back into descriptor tables holding arbitrary user code (flexible,
//! structured, user-registered types) never take this path.

use crate::MIN_PARALLEL_LENGTH;

/// Raw source pointer that may cross task boundaries. The split ranges are
/// disjoint, so concurrent readers never alias a writer.
#[derive(Clone, Copy)]
pub(crate) struct SendConstPtr(pub *const u8);

unsafe impl Send for SendConstPtr {}
unsafe impl Sync for SendConstPtr {}

/// Raw destination pointer that may cross task boundaries.
#[derive(Clone, Copy)]
pub(crate) struct SendMutPtr(pub *mut u8);

unsafe impl Send for SendMutPtr {}
unsafe impl Sync for SendMutPtr {}

/// Run `f(start, len)` over `0..n`, splitting in half while the pieces stay
/// above [`MIN_PARALLEL_LENGTH`]. Sequential without the `parallel` feature.
pub(crate) fn run_split(n: usize, f: &(dyn Fn(usize, usize) + Sync)) {
    split_range(0, n, f);
}

#[cfg(feature = "parallel")]
fn split_range(start: usize, len: usize, f: &(dyn Fn(usize, usize) + Sync)) {
    if len <= MIN_PARALLEL_LENGTH {
        f(start, len);
        return;
    }
    let half = len / 2;
    rayon::join(
        || split_range(start, half, f),
        || split_range(start + half, len - half, f),
    );
}

#[cfg(not(feature = "parallel"))]
fn split_range(start: usize, len: usize, f: &(dyn Fn(usize, usize) + Sync)) {
    let _ = MIN_PARALLEL_LENGTH;
    f(start, len);
}
