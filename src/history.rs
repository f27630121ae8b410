//! Control-flow signature generation and signature history.
//!
//! A signature is a small hash of recent call/return activity used as a
//! miss-table key. Two generators are provided: one that folds the whole
//! shadow return-address stack, and one that folds a short call FIFO with a
//! running return counter. Branches other than calls and returns never
//! touch signature state.

/// A signature generator folding the entire shadow return-address stack.
///
/// Calls push onto the ring and returns pop from it, so the signature
/// reflects the current call nesting rather than the raw call sequence.
/// The `^ 1` on return keeps a post-return signature distinct from the
/// pre-call signature of the same stack contents.
#[derive(Clone, Debug)]
pub struct RasSignature {
    /// Shadow return-address stack
    slots: Vec<u32>,
    /// Next push position
    head: usize,
}
impl RasSignature {
    pub fn new(depth: usize) -> Self {
        assert!(depth > 0);
        Self { slots: vec![0; depth], head: 0 }
    }

    /// Fold the stack into a 32-bit signature, oldest slot last.
    fn make_sig(&self) -> u32 {
        let mut sig = 0u32;
        for i in 0..self.slots.len() {
            let slot = self.slots[(self.head + i) % self.slots.len()];
            sig = sig.rotate_left(24) ^ slot;
        }
        sig
    }

    /// Push the call site and return the signature of the new stack.
    pub fn on_call(&mut self, ip: u64) -> u32 {
        self.slots[self.head] = ip as u32;
        self.head = (self.head + 1) % self.slots.len();
        self.make_sig()
    }

    /// Return the signature of the pre-pop stack (marked as a return),
    /// then pop the youngest frame.
    pub fn on_return(&mut self) -> u32 {
        let sig = self.make_sig() ^ 1;
        self.head = (self.head + self.slots.len() - 1) % self.slots.len();
        self.slots[self.head] = 0;
        sig
    }
}

/// Output width of [`CallFifoSignature`] signatures.
pub const FIFO_SIG_BITS: u32 = 16;

/// Rotation amount used by the FIFO fold. Coprime with the signature width
/// so repeated folding visits every bit position.
const FIFO_SIG_ROTATE: u32 = 5;

const FIFO_SIG_MASK: u64 = (1 << FIFO_SIG_BITS) - 1;

/// Salt applied per observed return.
const RETURN_SALT: u64 = 0xabcd;

/// A signature generator folding a FIFO of recent call sites together with
/// a count of the returns seen since the last call.
///
/// Unlike [`RasSignature`], returns do not unwind the FIFO; they only bump
/// the counter, so deep unwind sequences stay cheap to track.
#[derive(Clone, Debug)]
pub struct CallFifoSignature {
    /// Recent call sites
    slots: Vec<u64>,
    /// Next push position
    head: usize,
    /// Returns observed since the last call
    return_count: u64,
}
impl CallFifoSignature {
    pub fn new(depth: usize) -> Self {
        assert!(depth > 0);
        Self { slots: vec![0; depth], head: 0, return_count: 0 }
    }

    fn make_sig(&self) -> u16 {
        let mut sig = 0u64;
        for i in 0..self.slots.len() {
            let pc = self.slots[(self.head + i) % self.slots.len()];
            sig = ((sig << (FIFO_SIG_BITS - FIFO_SIG_ROTATE))
                | (sig >> FIFO_SIG_ROTATE)) & FIFO_SIG_MASK;
            sig ^= (pc ^ (pc >> 2)) & FIFO_SIG_MASK;
        }
        sig ^= self.return_count.wrapping_mul(RETURN_SALT) & FIFO_SIG_MASK;
        (sig & FIFO_SIG_MASK) as u16
    }

    /// Push the call site, clearing the return counter.
    pub fn on_call(&mut self, ip: u64) -> u16 {
        self.return_count = 0;
        self.slots[self.head] = ip;
        self.head = (self.head + 1) % self.slots.len();
        self.make_sig()
    }

    /// Count the return without disturbing the FIFO.
    pub fn on_return(&mut self) -> u16 {
        self.return_count += 1;
        self.make_sig()
    }
}

/// A ring of the most recent signatures, used to delay learning by a fixed
/// look-ahead distance.
///
/// [`SignatureHistory::back`] is the signature most recently pushed and is
/// the one a miss is learned under; [`SignatureHistory::front`] is the one
/// pushed `depth` events ago.
#[derive(Clone, Debug)]
pub struct SignatureHistory<S: Copy + Default> {
    slots: Vec<S>,
    head: usize,
}
impl<S: Copy + Default> SignatureHistory<S> {
    pub fn new(depth: usize) -> Self {
        assert!(depth > 0);
        Self { slots: vec![S::default(); depth], head: 0 }
    }

    pub fn depth(&self) -> usize { self.slots.len() }

    pub fn push(&mut self, sig: S) {
        self.slots[self.head] = sig;
        self.head = (self.head + 1) % self.slots.len();
    }

    /// The most recently pushed signature.
    pub fn back(&self) -> S {
        self.slots[(self.head + self.slots.len() - 1) % self.slots.len()]
    }

    /// The oldest signature in the ring.
    pub fn front(&self) -> S {
        self.slots[self.head]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ras_sig_of_single_call_is_the_call_site() {
        let mut gen = RasSignature::new(4);
        // With an all-zero stack the fold reduces to the pushed slot.
        assert_eq!(gen.on_call(0x1000), 0x1000);
    }

    #[test]
    fn ras_call_return_restores_the_signature() {
        let mut gen = RasSignature::new(4);
        let sig_a = gen.on_call(0x1000);
        gen.on_return();
        assert_eq!(gen.on_call(0x1000), sig_a);
    }

    #[test]
    fn ras_return_sig_differs_from_call_sig() {
        let mut gen = RasSignature::new(4);
        let sig_call = gen.on_call(0x1000);
        let sig_ret = gen.on_return();
        assert_eq!(sig_ret, sig_call ^ 1);
    }

    #[test]
    fn ras_nested_calls_fold_positionally() {
        let mut gen = RasSignature::new(4);
        gen.on_call(0x1000);
        let sig = gen.on_call(0x2000);
        assert_eq!(sig, 0x1000u32.rotate_left(24) ^ 0x2000);
    }

    #[test]
    fn ras_pop_clears_the_frame() {
        let mut gen = RasSignature::new(4);
        gen.on_call(0x1000);
        gen.on_call(0x2000);
        gen.on_return();
        // Back to a one-frame stack
        gen.on_return();
        assert_eq!(gen.on_call(0x3000), 0x3000);
    }

    #[test]
    fn fifo_sig_masks_to_sixteen_bits() {
        let mut gen = CallFifoSignature::new(1);
        let sig = gen.on_call(0xdead_beef_1234);
        assert_eq!(sig as u64 & !FIFO_SIG_MASK, 0);
    }

    #[test]
    fn fifo_returns_salt_the_signature() {
        let mut gen = CallFifoSignature::new(1);
        let sig_call = gen.on_call(0x4000);
        let sig_ret1 = gen.on_return();
        let sig_ret2 = gen.on_return();
        assert_ne!(sig_call, sig_ret1);
        assert_ne!(sig_ret1, sig_ret2);
        assert_eq!(sig_ret1, sig_call ^ (RETURN_SALT & FIFO_SIG_MASK) as u16);
    }

    #[test]
    fn fifo_call_resets_the_return_counter() {
        let mut gen = CallFifoSignature::new(1);
        let sig_a = gen.on_call(0x4000);
        gen.on_return();
        gen.on_return();
        assert_eq!(gen.on_call(0x4000), sig_a);
    }

    #[test]
    fn history_tracks_back_and_front() {
        let mut h: SignatureHistory<u32> = SignatureHistory::new(2);
        assert_eq!(h.back(), 0);
        assert_eq!(h.front(), 0);
        h.push(10);
        assert_eq!(h.back(), 10);
        assert_eq!(h.front(), 0);
        h.push(20);
        assert_eq!(h.back(), 20);
        assert_eq!(h.front(), 10);
        h.push(30);
        assert_eq!(h.back(), 30);
        assert_eq!(h.front(), 20);
    }
}
