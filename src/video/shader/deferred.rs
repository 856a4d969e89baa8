//! Uniform writes recorded while a program is not bound.

use std::collections::VecDeque;

use super::UniformOp;

/// A FIFO of pending uniform writes with at most one entry per name. Queuing
/// a name again drops the older write and appends the new one at the back.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    ops: VecDeque<UniformOp>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        DeferredQueue::default()
    }

    pub fn push(&mut self, op: UniformOp) {
        if let Some(i) = self.ops.iter().position(|v| v.name() == op.name()) {
            self.ops.remove(i);
        }

        self.ops.push_back(op);
    }

    /// Takes every pending write in replay order.
    pub fn take(&mut self) -> Vec<UniformOp> {
        self.ops.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UniformOp> {
        self.ops.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn float(name: &str, value: f32) -> UniformOp {
        UniformOp::SetFloat {
            name: name.to_owned(),
            value,
        }
    }

    #[test]
    fn later_writes_replace_and_move_back() {
        let mut queue = DeferredQueue::new();
        queue.push(float("a", 1.0));
        queue.push(float("b", 2.0));
        queue.push(float("a", 3.0));
        assert_eq!(queue.len(), 2);

        let names: Vec<_> = queue.iter().map(|v| v.name().to_owned()).collect();
        assert_eq!(names, vec!["b", "a"]);

        let ops = queue.take();
        assert!(queue.is_empty());
        assert_eq!(ops[1], float("a", 3.0));
    }

    #[test]
    fn different_kinds_share_a_name() {
        let mut queue = DeferredQueue::new();
        queue.push(float("x", 1.0));
        queue.push(UniformOp::SetBool {
            name: "x".to_owned(),
            value: true,
        });

        assert_eq!(queue.len(), 1);
        queue.clear();
        assert!(queue.is_empty());
    }
}
