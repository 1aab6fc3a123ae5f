use crate::axis::{Axis, AxisData};

/// Reusable per-axis scratch buffers for staged reads.
///
/// Each axis gets a buffer of its own dtype (identity, charge, or double). A
/// buffer keeps its allocation across `acquire` calls so chunked loops do not
/// reallocate on every chunk.
#[derive(Debug, Default)]
pub struct BufferPool {
    slots: [Option<AxisData>; 9],
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer for `axis` holding exactly `len` values (contents unspecified).
    pub fn acquire(&mut self, axis: Axis, len: usize) -> &mut AxisData {
        let slot = self.slots[axis.index()].get_or_insert_with(|| AxisData::absent(axis.dtype(), 0));
        slot.resize(len);
        slot
    }

    pub fn get(&self, axis: Axis) -> Option<&AxisData> {
        self.slots[axis.index()].as_ref()
    }

    /// Move a buffer out, e.g. to hand it to a reader that needs ownership.
    pub fn take(&mut self, axis: Axis) -> Option<AxisData> {
        self.slots[axis.index()].take()
    }

    /// Return a buffer taken with [`BufferPool::take`].
    pub fn reclaim(&mut self, axis: Axis, data: AxisData) {
        if data.dtype() == axis.dtype() {
            self.slots[axis.index()] = Some(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    #[test]
    fn acquire_uses_axis_dtype_and_length() {
        let mut pool = BufferPool::new();
        assert_eq!(pool.acquire(Axis::Id, 4).dtype(), DType::U64);
        assert_eq!(pool.acquire(Axis::Q, 3).dtype(), DType::I16);
        let x = pool.acquire(Axis::X, 5);
        assert_eq!(x.dtype(), DType::F64);
        assert_eq!(x.len(), 5);
        assert_eq!(pool.acquire(Axis::X, 2).len(), 2);
    }

    #[test]
    fn take_and_reclaim_keeps_allocation() {
        let mut pool = BufferPool::new();
        pool.acquire(Axis::W, 4);
        let buf = pool.take(Axis::W).unwrap();
        assert!(pool.get(Axis::W).is_none());
        pool.reclaim(Axis::W, buf);
        assert_eq!(pool.get(Axis::W).map(|b| b.len()), Some(4));
        // wrong dtype is dropped rather than stored
        pool.reclaim(Axis::Id, AxisData::F64(vec![1.0]));
        assert!(pool.get(Axis::Id).is_none());
    }
}
