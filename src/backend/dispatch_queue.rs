use std::collections::VecDeque;

use crate::instructions::instructions::InstrId;

// The DispatchQueue sits between frontend and backend. Instructions are
// enqueued in fetch order and only leave from the head, so an instruction
// that can't enter the scheduling window blocks everything behind it.
pub(crate) struct DispatchQueue {
    instructions: VecDeque<InstrId>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        DispatchQueue { instructions: VecDeque::new() }
    }

    pub fn size(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn enqueue(&mut self, id: InstrId) {
        debug_assert!(self.instructions.back().map_or(true, |last| *last < id),
                      "DispatchQueue: instruction {} enqueued out of order", id);
        self.instructions.push_back(id);
    }

    pub fn peek(&self) -> Option<InstrId> {
        self.instructions.front().copied()
    }

    pub fn dequeue(&mut self) -> InstrId {
        match self.instructions.pop_front() {
            Some(id) => id,
            None => panic!("Can't dequeue when DispatchQueue is empty."),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item=InstrId> + '_ {
        self.instructions.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo() {
        let mut queue = DispatchQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.peek(), None);

        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(3);
        assert_eq!(queue.size(), 3);
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![1, 2, 3]);

        assert_eq!(queue.peek(), Some(1));
        assert_eq!(queue.dequeue(), 1);
        assert_eq!(queue.dequeue(), 2);
        assert_eq!(queue.size(), 1);
    }

    #[test]
    #[should_panic]
    fn test_dequeue_empty() {
        let mut queue = DispatchQueue::new();
        queue.dequeue();
    }
}
