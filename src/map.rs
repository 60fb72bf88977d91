use std::cmp::Ordering;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::error::NilKeyError;

/// An ordered map implemented with a height-balanced AVL tree.
///
/// Keys are unique and totally ordered via [`Ord`]. Every mutation keeps the
/// tree AVL-balanced, so lookup, insertion and removal are O(log n).
///
/// ```
/// use avlmap::AvlMap;
///
/// let mut map = AvlMap::new();
/// assert!(map.insert(1, "one"));
/// assert!(map.insert(2, "two"));
/// assert!(!map.insert(2, "again"));
/// assert_eq!(map.get(&2), Some(&"two"));
/// assert!(map.remove(&1));
/// assert_eq!(map.get(&1), None);
/// ```
pub struct AvlMap<K: Ord, V> {
    root: Link<K, V>,
    num_nodes: usize,
}

struct Node<K, V> {
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
    parent: Link<K, V>,
    height: usize,
}

type NodePtr<K, V> = NonNull<Node<K, V>>;
type Link<K, V> = Option<NodePtr<K, V>>;
type LinkPtr<K, V> = NonNull<Link<K, V>>;

impl<K: Ord, V> AvlMap<K, V> {
    /// Creates an empty map.
    /// No memory is allocated until the first item is inserted.
    pub fn new() -> Self {
        Self {
            root: None,
            num_nodes: 0,
        }
    }

    /// Returns true if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the number of elements in the map.
    pub fn len(&self) -> usize {
        self.num_nodes
    }

    /// Returns the height of the tree, -1 if the map is empty.
    /// A map with a single element has height 0.
    pub fn height(&self) -> isize {
        match self.root {
            None => -1,
            Some(root_ptr) => unsafe { root_ptr.as_ref().height as isize },
        }
    }

    /// Returns the key-value pair at the root of the tree, if any.
    pub fn root(&self) -> Option<(&K, &V)> {
        self.root
            .map(|root_ptr| unsafe { (&(*root_ptr.as_ptr()).key, &(*root_ptr.as_ptr()).value) })
    }

    /// Returns a reference to the value corresponding to the key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key)
            .map(|node_ptr| unsafe { &(*node_ptr.as_ptr()).value })
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.find(key)
            .map(|node_ptr| unsafe { &mut (*node_ptr.as_ptr()).value })
    }

    /// Returns references to the key-value pair corresponding to the key.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        self.find(key)
            .map(|node_ptr| unsafe { (&(*node_ptr.as_ptr()).key, &(*node_ptr.as_ptr()).value) })
    }

    /// Returns true if the map contains the key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Inserts a key-value pair into the map.
    /// Returns false without touching the map if the key is already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        match self.find_insert_pos(&key) {
            None => false,
            Some((parent, mut link_ptr)) => {
                unsafe {
                    *link_ptr.as_mut() = Some(Node::create(parent, key, value));
                }
                self.num_nodes += 1;
                self.rebalance_after_insert(parent);
                true
            }
        }
    }

    /// Removes a key from the map.
    /// Returns whether the key was previously in the map.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.find(key) {
            None => false,
            Some(node_ptr) => {
                debug_assert!(self.num_nodes >= 1);
                self.unlink_node(node_ptr);
                unsafe { Node::destroy(node_ptr) };
                self.num_nodes -= 1;
                true
            }
        }
    }

    /// Looks up an optional key, rejecting an absent key as an error.
    /// A key that is present in the argument but missing from the map is an
    /// expected miss and yields `Ok(None)`.
    pub fn try_get(&self, key: Option<&K>) -> Result<Option<&V>, NilKeyError> {
        match key {
            None => Err(NilKeyError),
            Some(key) => Ok(self.get(key)),
        }
    }

    /// Inserts under an optional key, rejecting an absent key as an error.
    /// A duplicate key is an expected outcome and yields `Ok(false)`.
    pub fn try_insert(&mut self, key: Option<K>, value: V) -> Result<bool, NilKeyError> {
        match key {
            None => Err(NilKeyError),
            Some(key) => Ok(self.insert(key, value)),
        }
    }

    /// Removes an optional key, rejecting an absent key as an error.
    /// A key not present in the map is an expected outcome and yields
    /// `Ok(false)`.
    pub fn try_remove(&mut self, key: Option<&K>) -> Result<bool, NilKeyError> {
        match key {
            None => Err(NilKeyError),
            Some(key) => Ok(self.remove(key)),
        }
    }

    /// Clears the map, deallocating all memory.
    pub fn clear(&mut self) {
        unsafe {
            let mut current = self.root;
            while let Some(node_ptr) = current {
                if let Some(left_ptr) = node_ptr.as_ref().left {
                    current = Some(left_ptr);
                } else if let Some(right_ptr) = node_ptr.as_ref().right {
                    current = Some(right_ptr);
                } else {
                    // Leaf: unhook from the parent, destroy, resume there.
                    let parent = node_ptr.as_ref().parent;
                    if let Some(mut parent_ptr) = parent {
                        if parent_ptr.as_ref().left == Some(node_ptr) {
                            parent_ptr.as_mut().left = None;
                        } else {
                            parent_ptr.as_mut().right = None;
                        }
                    }
                    Node::destroy(node_ptr);
                    current = parent;
                }
            }
        }
        self.root = None;
        self.num_nodes = 0;
    }

    /// Gets an iterator over the entries of the map, sorted by key.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            next: self.root.map(leftmost),
            remaining: self.num_nodes,
            marker: PhantomData,
        }
    }

    /// Gets an iterator over the keys of the map, in sorted order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Gets an iterator over the values of the map, in order by key.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Verifies every structural invariant of the tree and panics on the
    /// first violation: strict BST order over whole subtrees, AVL balance,
    /// cached heights, parent back-references and the node count.
    #[cfg(any(test, feature = "consistency_check"))]
    pub fn check_consistency(&self) {
        unsafe {
            let mut num_nodes = 0;
            Self::check_subtree(self.root, None, None, None, &mut num_nodes);
            assert_eq!(num_nodes, self.num_nodes);
        }
    }

    #[cfg(any(test, feature = "consistency_check"))]
    unsafe fn check_subtree(
        link: Link<K, V>,
        parent: Link<K, V>,
        lower: Option<&K>,
        upper: Option<&K>,
        num_nodes: &mut usize,
    ) -> isize {
        let node_ptr = match link {
            None => return -1,
            Some(node_ptr) => node_ptr,
        };
        let node = &*node_ptr.as_ptr();
        assert!(node.parent == parent);
        if let Some(lower) = lower {
            assert!(*lower < node.key);
        }
        if let Some(upper) = upper {
            assert!(node.key < *upper);
        }
        let left_height = Self::check_subtree(node.left, link, lower, Some(&node.key), num_nodes);
        let right_height = Self::check_subtree(node.right, link, Some(&node.key), upper, num_nodes);
        assert!((left_height - right_height).abs() <= 1);
        let height = 1 + left_height.max(right_height);
        assert_eq!(node.height as isize, height);
        *num_nodes += 1;
        height
    }

    fn find(&self, key: &K) -> Link<K, V> {
        let mut current = self.root;
        unsafe {
            while let Some(node_ptr) = current {
                match key.cmp(&node_ptr.as_ref().key) {
                    Ordering::Less => current = node_ptr.as_ref().left,
                    Ordering::Greater => current = node_ptr.as_ref().right,
                    Ordering::Equal => return Some(node_ptr),
                }
            }
        }
        None
    }

    /// Descends to the link where the key belongs, tracking the prospective
    /// parent node. Returns None if the key is already present.
    fn find_insert_pos(&mut self, key: &K) -> Option<(Link<K, V>, LinkPtr<K, V>)> {
        let mut parent: Link<K, V> = None;
        let mut link_ptr: LinkPtr<K, V> = unsafe { LinkPtr::new_unchecked(&mut self.root) };
        unsafe {
            while let Some(mut node_ptr) = *link_ptr.as_ref() {
                link_ptr = match key.cmp(&node_ptr.as_ref().key) {
                    Ordering::Equal => return None,
                    Ordering::Less => LinkPtr::new_unchecked(&mut node_ptr.as_mut().left),
                    Ordering::Greater => LinkPtr::new_unchecked(&mut node_ptr.as_mut().right),
                };
                parent = Some(node_ptr);
            }
        }
        Some((parent, link_ptr))
    }

    /// Splices the node out of the tree, choosing the replacement by case
    /// analysis on its children, then rebalances upward from the point where
    /// the tree actually shrank.
    fn unlink_node(&mut self, node_ptr: NodePtr<K, V>) {
        unsafe {
            let rebalance_from = match (node_ptr.as_ref().left, node_ptr.as_ref().right) {
                (None, None) => {
                    let parent = node_ptr.as_ref().parent;
                    self.replace_in_parent(node_ptr, None);
                    parent
                }
                (None, Some(right_ptr)) => {
                    self.replace_in_parent(node_ptr, Some(right_ptr));
                    Some(right_ptr)
                }
                (Some(left_ptr), None) => {
                    self.replace_in_parent(node_ptr, Some(left_ptr));
                    Some(left_ptr)
                }
                (Some(left_ptr), Some(right_ptr)) => {
                    if left_ptr.as_ref().right.is_none() {
                        // Left child moves up and adopts the right subtree.
                        Node::set_right(left_ptr, Some(right_ptr));
                        self.replace_in_parent(node_ptr, Some(left_ptr));
                        Some(left_ptr)
                    } else if right_ptr.as_ref().left.is_none() {
                        // Mirror image: right child moves up.
                        Node::set_left(right_ptr, Some(left_ptr));
                        self.replace_in_parent(node_ptr, Some(right_ptr));
                        Some(right_ptr)
                    } else {
                        // General case: splice in the in-order predecessor,
                        // the rightmost node of the left subtree.
                        let mut pred_parent_ptr = node_ptr;
                        let mut pred_ptr = left_ptr;
                        while let Some(next_ptr) = pred_ptr.as_ref().right {
                            pred_parent_ptr = pred_ptr;
                            pred_ptr = next_ptr;
                        }
                        debug_assert!(pred_parent_ptr != node_ptr);

                        // Detach the predecessor; its left subtree takes its place.
                        Node::set_right(pred_parent_ptr, pred_ptr.as_ref().left);

                        // The predecessor takes over both subtrees of the
                        // removed node; the tree shrank below its old parent.
                        Node::set_left(pred_ptr, Some(left_ptr));
                        Node::set_right(pred_ptr, Some(right_ptr));
                        self.replace_in_parent(node_ptr, Some(pred_ptr));
                        Some(pred_parent_ptr)
                    }
                }
            };
            self.rebalance(rebalance_from);
        }
    }

    /// Points the link that owns `node_ptr` at `replacement` instead and
    /// updates the replacement's parent back-reference. `node_ptr` itself is
    /// left untouched.
    unsafe fn replace_in_parent(&mut self, node_ptr: NodePtr<K, V>, replacement: Link<K, V>) {
        let parent = node_ptr.as_ref().parent;
        if let Some(mut repl_ptr) = replacement {
            repl_ptr.as_mut().parent = parent;
        }
        match parent {
            None => self.root = replacement,
            Some(mut parent_ptr) => {
                if parent_ptr.as_ref().left == Some(node_ptr) {
                    parent_ptr.as_mut().left = replacement;
                } else {
                    parent_ptr.as_mut().right = replacement;
                }
            }
        }
    }

    fn left_height(node_ptr: NodePtr<K, V>) -> usize {
        unsafe {
            match node_ptr.as_ref().left {
                None => 0,
                Some(left_ptr) => left_ptr.as_ref().height + 1,
            }
        }
    }

    fn right_height(node_ptr: NodePtr<K, V>) -> usize {
        unsafe {
            match node_ptr.as_ref().right {
                None => 0,
                Some(right_ptr) => right_ptr.as_ref().height + 1,
            }
        }
    }

    fn adjust_height(mut node_ptr: NodePtr<K, V>) {
        unsafe {
            node_ptr.as_mut().height =
                std::cmp::max(Self::left_height(node_ptr), Self::right_height(node_ptr));
        }
    }

    /// Rotates the subtree rooted at the given node to the left.
    /// The right child takes its place and is returned as the new subtree
    /// root. Only links, parent back-references and the two affected heights
    /// change; no node is created or destroyed.
    fn rotate_left(&mut self, node_ptr: NodePtr<K, V>) -> NodePtr<K, V> {
        unsafe {
            let right_ptr = node_ptr.as_ref().right.unwrap();
            Node::set_right(node_ptr, right_ptr.as_ref().left);
            self.replace_in_parent(node_ptr, Some(right_ptr));
            Node::set_left(right_ptr, Some(node_ptr));
            Self::adjust_height(node_ptr);
            Self::adjust_height(right_ptr);
            right_ptr
        }
    }

    /// Rotates the subtree rooted at the given node to the right.
    /// The left child takes its place and is returned as the new subtree root.
    fn rotate_right(&mut self, node_ptr: NodePtr<K, V>) -> NodePtr<K, V> {
        unsafe {
            let left_ptr = node_ptr.as_ref().left.unwrap();
            Node::set_left(node_ptr, left_ptr.as_ref().right);
            self.replace_in_parent(node_ptr, Some(left_ptr));
            Node::set_right(left_ptr, Some(node_ptr));
            Self::adjust_height(node_ptr);
            Self::adjust_height(left_ptr);
            left_ptr
        }
    }

    /// Rebalances nodes from the given position up to the root, recomputing
    /// cached heights as it goes. A rotation changes the local subtree root,
    /// so the walk continues from the parent of whatever node ends up on top.
    fn rebalance(&mut self, start_from: Link<K, V>) {
        let mut current = start_from;
        while let Some(node_ptr) = current {
            let subtree_root = self.restore_balance(node_ptr);
            current = unsafe { subtree_root.as_ref().parent };
        }
    }

    /// Rebalances nodes from the given position up to the root, stopping
    /// after the first rotation. The rotated subtree regains the height it
    /// had before the insert, so all ancestor heights are valid again and at
    /// most one rotation is ever needed per insertion.
    fn rebalance_after_insert(&mut self, start_from: Link<K, V>) {
        let mut current = start_from;
        while let Some(node_ptr) = current {
            let subtree_root = self.restore_balance(node_ptr);
            if subtree_root != node_ptr {
                break;
            }
            current = unsafe { subtree_root.as_ref().parent };
        }
    }

    /// Recomputes the cached height at the given node and restores the AVL
    /// condition with a single or double rotation once the height difference
    /// between its subtrees has reached 2. The difference can never exceed 2
    /// after a single insert or remove. Returns the node now rooting this
    /// subtree.
    ///
    /// The rotation case is chosen by which child and grandchild sit on the
    /// taller side. When the taller child's own subtrees are equally tall
    /// (possible only after a removal) a single rotation restores balance.
    fn restore_balance(&mut self, node_ptr: NodePtr<K, V>) -> NodePtr<K, V> {
        let left_height = Self::left_height(node_ptr);
        let right_height = Self::right_height(node_ptr);
        debug_assert!(left_height <= right_height + 2);
        debug_assert!(right_height <= left_height + 2);
        if left_height > right_height + 1 {
            // Left-left or left-right case.
            let left_ptr = unsafe { node_ptr.as_ref().left.unwrap() };
            if Self::right_height(left_ptr) > Self::left_height(left_ptr) {
                self.rotate_left(left_ptr);
            }
            self.rotate_right(node_ptr)
        } else if right_height > left_height + 1 {
            // Right-right or right-left case.
            let right_ptr = unsafe { node_ptr.as_ref().right.unwrap() };
            if Self::left_height(right_ptr) > Self::right_height(right_ptr) {
                self.rotate_right(right_ptr);
            }
            self.rotate_left(node_ptr)
        } else {
            Self::adjust_height(node_ptr);
            node_ptr
        }
    }
}

impl<K: Ord, V> Drop for AvlMap<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K: Ord, V> Default for AvlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for AvlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord + Clone, V: Clone> Clone for AvlMap<K, V> {
    fn clone(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<K: Ord, V: PartialEq> PartialEq for AvlMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Ord, V: Eq> Eq for AvlMap<K, V> {}

impl<K: Ord, V> FromIterator<(K, V)> for AvlMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: Ord, V> Extend<(K, V)> for AvlMap<K, V> {
    /// Inserts each pair in turn. Because duplicate keys are rejected, the
    /// first occurrence of a key wins.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<'a, K: Ord, V> IntoIterator for &'a AvlMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

// The map owns its nodes exclusively and the raw pointers never escape,
// so thread safety reduces to that of the keys and values.
unsafe impl<K: Ord + Send, V: Send> Send for AvlMap<K, V> {}
unsafe impl<K: Ord + Sync, V: Sync> Sync for AvlMap<K, V> {}

/// An iterator over the entries of an [`AvlMap`], sorted by key.
pub struct Iter<'a, K, V> {
    next: Link<K, V>,
    remaining: usize,
    marker: PhantomData<(&'a K, &'a V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        let node_ptr = self.next?;
        unsafe {
            let node = &*node_ptr.as_ptr();
            self.next = successor(node_ptr);
            self.remaining -= 1;
            Some((&node.key, &node.value))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            next: self.next,
            remaining: self.remaining,
            marker: PhantomData,
        }
    }
}

unsafe impl<K: Sync, V: Sync> Send for Iter<'_, K, V> {}
unsafe impl<K: Sync, V: Sync> Sync for Iter<'_, K, V> {}

/// An iterator over the keys of an [`AvlMap`], in sorted order.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of an [`AvlMap`], in order by key.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

fn leftmost<K, V>(mut node_ptr: NodePtr<K, V>) -> NodePtr<K, V> {
    unsafe {
        while let Some(left_ptr) = node_ptr.as_ref().left {
            node_ptr = left_ptr;
        }
    }
    node_ptr
}

/// Returns the in-order successor: the leftmost node of the right subtree,
/// or else the first ancestor reached through a left-child link.
fn successor<K, V>(node_ptr: NodePtr<K, V>) -> Link<K, V> {
    unsafe {
        if let Some(right_ptr) = node_ptr.as_ref().right {
            return Some(leftmost(right_ptr));
        }
        let mut child_ptr = node_ptr;
        let mut current = node_ptr.as_ref().parent;
        while let Some(parent_ptr) = current {
            if parent_ptr.as_ref().left == Some(child_ptr) {
                return current;
            }
            child_ptr = parent_ptr;
            current = parent_ptr.as_ref().parent;
        }
        None
    }
}

impl<K, V> Node<K, V> {
    fn create(parent: Link<K, V>, key: K, value: V) -> NodePtr<K, V> {
        let boxed = Box::new(Node {
            key,
            value,
            parent,
            left: None,
            right: None,
            height: 0,
        });
        unsafe { NodePtr::new_unchecked(Box::into_raw(boxed)) }
    }

    unsafe fn destroy(node_ptr: NodePtr<K, V>) {
        drop(Box::from_raw(node_ptr.as_ptr()));
    }

    /// Sets the left child and its parent back-reference.
    unsafe fn set_left(mut parent_ptr: NodePtr<K, V>, child: Link<K, V>) {
        parent_ptr.as_mut().left = child;
        if let Some(mut child_ptr) = child {
            child_ptr.as_mut().parent = Some(parent_ptr);
        }
    }

    /// Sets the right child and its parent back-reference.
    unsafe fn set_right(mut parent_ptr: NodePtr<K, V>, child: Link<K, V>) {
        parent_ptr.as_mut().right = child;
        if let Some(mut child_ptr) = child {
            child_ptr.as_mut().parent = Some(parent_ptr);
        }
    }
}
