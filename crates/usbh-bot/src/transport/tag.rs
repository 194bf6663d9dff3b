/// Source of CBW tags for one device session.
///
/// Starts at 1 and hands out consecutive values, wrapping at `u32::MAX`.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    next: u32,
}

impl TagGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self { next: first }
    }

    /// Take the next tag.
    pub fn issue(&mut self) -> u32 {
        let tag = self.next;
        self.next = self.next.wrapping_add(1);
        tag
    }

    /// The tag the next call to [`issue`](Self::issue) will return.
    pub fn peek(&self) -> u32 {
        self.next
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_by_one_from_one() {
        let mut tags = TagGenerator::new();
        let issued: Vec<u32> = (0..1000).map(|_| tags.issue()).collect();
        assert_eq!(issued[0], 1);
        assert!(issued.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(tags.peek(), 1001);
    }

    #[test]
    fn wraps() {
        let mut tags = TagGenerator::starting_at(u32::MAX);
        assert_eq!(tags.issue(), u32::MAX);
        assert_eq!(tags.issue(), 0);
    }
}
