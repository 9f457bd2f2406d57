//! Ordered index backing the SortedSet variant, used for ZSET ordering.
//! Plain owned nodes rather than `Arc<RwLock<_>>`: single-threaded
//! ownership is sufficient because the dispatcher's global lock already
//! serializes all access.

use rand::Rng;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, Weak};

const MAX_LEVEL: usize = 32;

type Link = Option<Arc<Mutex<Node>>>;

#[derive(Debug)]
struct Node {
    member: Vec<u8>,
    score: f64,
    forward: Vec<Link>,
    span: Vec<usize>,
    backward: Option<Weak<Mutex<Node>>>,
}

impl Node {
    fn new(level: usize, score: f64, member: Vec<u8>) -> Arc<Mutex<Node>> {
        Arc::new(Mutex::new(Node {
            member,
            score,
            forward: vec![None; level],
            span: vec![0; level],
            backward: None,
        }))
    }
}

fn key_less(score_a: f64, member_a: &[u8], score_b: f64, member_b: &[u8]) -> bool {
    match score_a.partial_cmp(&score_b).unwrap_or(Ordering::Equal) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => member_a < member_b,
    }
}

#[derive(Debug)]
pub struct SkipList {
    head: Arc<Mutex<Node>>,
    tail: Link,
    length: usize,
    level: usize,
}

impl SkipList {
    pub fn new() -> SkipList {
        SkipList {
            head: Node::new(MAX_LEVEL, f64::MIN, Vec::new()),
            tail: None,
            length: 0,
            level: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    fn random_level(&self) -> usize {
        let mut rng = rand::thread_rng();
        let mut level = 1;
        while level < MAX_LEVEL && rng.gen_ratio(1, 4) {
            level += 1;
        }
        level
    }

    pub fn insert(&mut self, score: f64, member: Vec<u8>) {
        let mut update: Vec<Arc<Mutex<Node>>> = Vec::with_capacity(MAX_LEVEL);
        let mut rank = vec![0usize; MAX_LEVEL];
        let mut x = self.head.clone();
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            loop {
                let next = x.lock().unwrap().forward[i].clone();
                let advance = match &next {
                    Some(n) => key_less(n.lock().unwrap().score, &n.lock().unwrap().member, score, &member),
                    None => false,
                };
                if !advance {
                    break;
                }
                rank[i] += x.lock().unwrap().span[i];
                let n = next.unwrap();
                x = n;
            }
            update.push(x.clone());
        }
        update.reverse();

        let level = self.random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update.insert(0, self.head.clone());
                self.head.lock().unwrap().forward.resize(level, None);
                self.head.lock().unwrap().span.resize(level, self.length);
                let _ = i;
            }
            self.level = level;
        }

        let new_node = Node::new(level, score, member);
        for i in 0..level {
            let upd = &update[i];
            new_node.lock().unwrap().forward[i] = upd.lock().unwrap().forward[i].clone();
            upd.lock().unwrap().forward[i] = Some(new_node.clone());
            let span_here = rank[0] - rank[i] + 1;
            new_node.lock().unwrap().span[i] = upd.lock().unwrap().span[i].saturating_sub(span_here - 1);
            upd.lock().unwrap().span[i] = span_here;
        }
        for i in level..self.level {
            if let Some(upd) = update.get(i) {
                upd.lock().unwrap().span[i] += 1;
            }
        }

        let next0 = new_node.lock().unwrap().forward[0].clone();
        match &next0 {
            Some(n) => n.lock().unwrap().backward = Some(Arc::downgrade(&new_node)),
            None => self.tail = Some(new_node.clone()),
        }
        new_node.lock().unwrap().backward = if Arc::ptr_eq(&update[0], &self.head) {
            None
        } else {
            Some(Arc::downgrade(&update[0]))
        };
        self.length += 1;
    }

    pub fn delete(&mut self, score: f64, member: &[u8]) -> bool {
        let mut update: Vec<Arc<Mutex<Node>>> = Vec::with_capacity(MAX_LEVEL);
        let mut x = self.head.clone();
        for i in (0..self.level).rev() {
            loop {
                let next = x.lock().unwrap().forward[i].clone();
                let advance = match &next {
                    Some(n) => key_less(n.lock().unwrap().score, &n.lock().unwrap().member, score, member),
                    None => false,
                };
                if !advance {
                    break;
                }
                x = next.unwrap();
            }
            update.push(x.clone());
        }
        update.reverse();
        let candidate = x.lock().unwrap().forward[0].clone();
        if let Some(node) = candidate {
            if node.lock().unwrap().score == score && node.lock().unwrap().member == member {
                self.delete_node(&node, &update);
                return true;
            }
        }
        false
    }

    fn delete_node(&mut self, node: &Arc<Mutex<Node>>, update: &[Arc<Mutex<Node>>]) {
        for i in 0..self.level {
            let upd = &update[i];
            let is_target = upd
                .lock().unwrap()
                .forward
                .get(i)
                .and_then(|f| f.as_ref().map(|n| Arc::ptr_eq(n, node)))
                .unwrap_or(false);
            if is_target {
                let node_span = node.lock().unwrap().span.get(i).copied().unwrap_or(1);
                let node_fwd = node.lock().unwrap().forward.get(i).cloned().flatten();
                let mut upd_mut = upd.lock().unwrap();
                upd_mut.span[i] += node_span.saturating_sub(1);
                upd_mut.forward[i] = node_fwd;
            } else if i < upd.lock().unwrap().span.len() {
                upd.lock().unwrap().span[i] = upd.lock().unwrap().span[i].saturating_sub(1);
            }
        }
        let next0 = node.lock().unwrap().forward[0].clone();
        match next0 {
            Some(n) => n.lock().unwrap().backward = node.lock().unwrap().backward.clone(),
            None => {
                self.tail = node
                    .lock().unwrap()
                    .backward
                    .as_ref()
                    .and_then(|w| w.upgrade());
            }
        }
        while self.level > 1 && self.head.lock().unwrap().forward[self.level - 1].is_none() {
            self.level -= 1;
        }
        self.length -= 1;
    }

    /// 1-based rank lookup.
    pub fn by_rank(&self, rank: usize) -> Option<(f64, Vec<u8>)> {
        if rank == 0 || rank > self.length {
            return None;
        }
        let mut traversed = 0usize;
        let mut x = self.head.clone();
        for i in (0..self.level).rev() {
            loop {
                let next = x.lock().unwrap().forward[i].clone();
                let step = x.lock().unwrap().span.get(i).copied().unwrap_or(1);
                if next.is_none() || traversed + step > rank {
                    break;
                }
                traversed += step;
                x = next.unwrap();
            }
            if traversed == rank {
                let n = x.lock().unwrap();
                return Some((n.score, n.member.clone()));
            }
        }
        None
    }

    pub fn rank_of(&self, score: f64, member: &[u8]) -> Option<usize> {
        let mut rank = 0usize;
        let mut x = self.head.clone();
        for i in (0..self.level).rev() {
            loop {
                let next = x.lock().unwrap().forward[i].clone();
                let advance = match &next {
                    Some(n) => {
                        key_less(n.lock().unwrap().score, &n.lock().unwrap().member, score, member)
                            || (n.lock().unwrap().score == score && n.lock().unwrap().member == member)
                    }
                    None => false,
                };
                if !advance {
                    break;
                }
                rank += x.lock().unwrap().span.get(i).copied().unwrap_or(1);
                x = next.unwrap();
            }
            if x.lock().unwrap().score == score && x.lock().unwrap().member == member {
                return Some(rank);
            }
        }
        None
    }

    pub fn iter_range_by_score(&self, min: f64, max: f64) -> Vec<(f64, Vec<u8>)> {
        let mut out = Vec::new();
        let mut cur = self.head.lock().unwrap().forward[0].clone();
        while let Some(n) = cur {
            let (score, member) = { (n.lock().unwrap().score, n.lock().unwrap().member.clone()) };
            if score > max {
                break;
            }
            if score >= min {
                out.push((score, member));
            }
            cur = n.lock().unwrap().forward[0].clone();
        }
        out
    }

    pub fn iter_all(&self) -> Vec<(f64, Vec<u8>)> {
        let mut out = Vec::with_capacity(self.length);
        let mut cur = self.head.lock().unwrap().forward[0].clone();
        while let Some(n) = cur {
            out.push((n.lock().unwrap().score, n.lock().unwrap().member.clone()));
            cur = n.lock().unwrap().forward[0].clone();
        }
        out
    }
}

impl Default for SkipList {
    fn default() -> Self {
        SkipList::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_rank_order() {
        let mut sl = SkipList::new();
        sl.insert(3.0, b"c".to_vec());
        sl.insert(1.0, b"a".to_vec());
        sl.insert(2.0, b"b".to_vec());
        assert_eq!(sl.len(), 3);
        assert_eq!(sl.by_rank(1), Some((1.0, b"a".to_vec())));
        assert_eq!(sl.by_rank(2), Some((2.0, b"b".to_vec())));
        assert_eq!(sl.by_rank(3), Some((3.0, b"c".to_vec())));
    }

    #[test]
    fn delete_removes_member() {
        let mut sl = SkipList::new();
        sl.insert(1.0, b"a".to_vec());
        sl.insert(2.0, b"b".to_vec());
        assert!(sl.delete(1.0, b"a"));
        assert_eq!(sl.len(), 1);
        assert_eq!(sl.by_rank(1), Some((2.0, b"b".to_vec())));
    }

    #[test]
    fn ties_break_on_member_lexicographically() {
        let mut sl = SkipList::new();
        sl.insert(1.0, b"b".to_vec());
        sl.insert(1.0, b"a".to_vec());
        assert_eq!(sl.by_rank(1), Some((1.0, b"a".to_vec())));
        assert_eq!(sl.by_rank(2), Some((1.0, b"b".to_vec())));
    }

    #[test]
    fn range_by_score_is_inclusive() {
        let mut sl = SkipList::new();
        for i in 0..10 {
            sl.insert(i as f64, format!("m{}", i).into_bytes());
        }
        let range = sl.iter_range_by_score(3.0, 5.0);
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn rank_of_finds_existing_member() {
        let mut sl = SkipList::new();
        sl.insert(1.0, b"a".to_vec());
        sl.insert(2.0, b"b".to_vec());
        sl.insert(3.0, b"c".to_vec());
        assert_eq!(sl.rank_of(2.0, b"b"), Some(2));
        assert_eq!(sl.rank_of(9.0, b"z"), None);
    }
}
