
use core::cmp::Ordering;


// min/max
pub(crate) use core::cmp::max;

// scmp/sdiff, ticks are compared through their wrapping difference so a
// narrow utick keeps ordering timers correctly across overflow, as long as
// no two pending deadlines are more than half the tick range apart
pub(crate) trait Scmp {
    type Output;
    fn sdiff(self, b: Self) -> Self::Output;
    fn scmp(self, b: Self) -> Ordering;
}

impl Scmp for u128 {
    type Output = i128;

    #[inline]
    fn sdiff(self, b: u128) -> i128 {
        self.wrapping_sub(b) as i128
    }

    #[inline]
    fn scmp(self, b: u128) -> Ordering {
        self.sdiff(b).cmp(&0)
    }
}

impl Scmp for u64 {
    type Output = i64;

    #[inline]
    fn sdiff(self, b: u64) -> i64 {
        self.wrapping_sub(b) as i64
    }

    #[inline]
    fn scmp(self, b: u64) -> Ordering {
        self.sdiff(b).cmp(&0)
    }
}

impl Scmp for u32 {
    type Output = i32;

    #[inline]
    fn sdiff(self, b: u32) -> i32 {
        self.wrapping_sub(b) as i32
    }

    #[inline]
    fn scmp(self, b: u32) -> Ordering {
        self.sdiff(b).cmp(&0)
    }
}

#[inline]
pub(crate) fn sdiff<T: Scmp>(a: T, b: T) -> <T as Scmp>::Output {
    a.sdiff(b)
}

#[inline]
pub(crate) fn scmp<T: Scmp>(a: T, b: T) -> Ordering {
    a.scmp(b)
}
