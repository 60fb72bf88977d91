//! An ordered map implemented with a height-balanced AVL tree.
//!
//! [`AvlMap`] stores unique, totally ordered keys. The tree keeps the AVL
//! balance condition (subtree heights differ by at most one at every node)
//! after each insertion and removal, so every operation runs in O(log n).
//!
//! ```
//! use avlmap::AvlMap;
//!
//! let mut map = AvlMap::new();
//! map.insert(2, "two");
//! map.insert(1, "one");
//! map.insert(3, "three");
//!
//! assert_eq!(map.get(&1), Some(&"one"));
//! assert_eq!(map.len(), 3);
//!
//! let keys: Vec<i32> = map.keys().copied().collect();
//! assert_eq!(keys, [1, 2, 3]);
//!
//! map.remove(&2);
//! assert!(!map.contains_key(&2));
//! ```
//!
//! The checked operations treat an absent key argument as an error rather
//! than a miss:
//!
//! ```
//! use avlmap::{AvlMap, NilKeyError};
//!
//! let mut map: AvlMap<i32, i32> = AvlMap::new();
//! assert_eq!(map.try_insert(Some(1), 10), Ok(true));
//! assert_eq!(map.try_get(Some(&2)), Ok(None));
//! assert_eq!(map.try_remove(None), Err(NilKeyError));
//! ```
//!
//! With the `consistency_check` feature enabled the internal invariant
//! checker [`AvlMap::check_consistency`] is available outside of tests.

mod error;
mod map;

pub use crate::error::NilKeyError;
pub use crate::map::{AvlMap, Iter, Keys, Values};
