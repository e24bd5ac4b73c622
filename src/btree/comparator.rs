//! Key ordering, dispatched by the owning database's declared `KeyType`.
//! Per-key-type ordering used by find/insert/erase and cursor seeks.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::KeyType;

/// A key comparator bound to a database at open time. `Custom` carries a
/// user callback; the built-in variants are unsigned-integer or raw byte
/// memcmp, dispatched by the database's declared key type.
#[derive(Clone)]
pub enum Comparator {
    UintMemcmp { width: usize },
    BinaryMemcmp,
    Custom(Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>),
}

impl Comparator {
    pub fn for_key_type(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Uint8 => Comparator::UintMemcmp { width: 1 },
            KeyType::Uint16 => Comparator::UintMemcmp { width: 2 },
            KeyType::Uint32 | KeyType::Real32 => Comparator::UintMemcmp { width: 4 },
            KeyType::Uint64 | KeyType::Real64 => Comparator::UintMemcmp { width: 8 },
            KeyType::Binary => Comparator::BinaryMemcmp,
            KeyType::Custom => Comparator::BinaryMemcmp,
        }
    }

    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            Comparator::UintMemcmp { width } => {
                debug_assert_eq!(a.len(), *width);
                debug_assert_eq!(b.len(), *width);
                // Little-endian on disk; compare as unsigned integers, not
                // as raw bytes, so multi-byte keys sort numerically.
                for i in (0..*width).rev() {
                    match a[i].cmp(&b[i]) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                Ordering::Equal
            }
            Comparator::BinaryMemcmp => a.cmp(b),
            Comparator::Custom(f) => f(a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_memcmp_orders_numerically_not_lexically() {
        let cmp = Comparator::UintMemcmp { width: 4 };
        let small = 1u32.to_le_bytes();
        let big = 256u32.to_le_bytes();
        assert_eq!(cmp.compare(&small, &big), Ordering::Less);
    }
}
