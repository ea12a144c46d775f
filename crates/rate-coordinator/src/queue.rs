use std::cmp::Ordering;

use tokio::sync::oneshot;

/// One waiter in a credential's admission queue. Ordered so that `BinaryHeap`
/// (a max-heap) pops the highest-priority, then oldest (lowest `seq`) waiter
/// first, matching the priority-respecting FIFO the scheduler needs.
pub struct PendingAdmission {
    pub priority: u8,
    pub seq: u64,
    pub grant: oneshot::Sender<()>,
}

impl PartialEq for PendingAdmission {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for PendingAdmission {}

impl PartialOrd for PendingAdmission {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingAdmission {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            // lower seq (older) must win when priority ties, so reverse seq comparison
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
