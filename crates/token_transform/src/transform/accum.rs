//! Accumulator chain.
//!
//! Each node sits where an asynchronous expansion was spliced into a token
//! stream. It receives tokens from its child (the expansion) and from its
//! sibling (whatever followed the expansion in the original stream) and
//! passes them upstream as "all child tokens, then all sibling tokens".
//!
//! Invariants:
//! - A node forwards child tokens as soon as they arrive.
//! - Sibling tokens are buffered until the child side is complete.
//! - A node is freed once both sides are complete and its buffer is empty.
//! - Deliveries are routed from a FIFO work list, never by recursion.

use std::collections::VecDeque;

use crate::shared::{Chunk, DocumentContext, Rank, StreamIntegrityError};

/// Index of a node in the [`AccumArena`]. Never reused within an arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccumId(usize);

impl AccumId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Where a node (or a continuation) sends its tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Upstream {
    /// Straight out of the manager.
    Emit,
    /// Into a node, as its child stream.
    Child(AccumId),
    /// Into a node, as its sibling stream.
    Sibling(AccumId),
}

/// One pending hand-off. `chunk.async_mode` is the "more to come" flag.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub target: Upstream,
    pub chunk: Chunk,
}

impl Delivery {
    pub fn new(target: Upstream, chunk: Chunk) -> Self {
        Self { target, chunk }
    }
}

#[derive(Debug)]
struct AccumNode {
    waiting_for_child: bool,
    waiting_for_sibling: bool,
    sibling_chunks: VecDeque<Chunk>,
    upstream: Upstream,
}

#[derive(Debug)]
pub struct AccumArena {
    phase_end: Rank,
    nodes: Vec<Option<AccumNode>>,
    live: usize,
}

impl AccumArena {
    pub fn new(phase_end: Rank) -> Self {
        Self {
            phase_end,
            nodes: Vec::new(),
            live: 0,
        }
    }

    pub fn add_node(&mut self, upstream: Upstream) -> AccumId {
        let id = AccumId(self.nodes.len());
        self.nodes.push(Some(AccumNode {
            waiting_for_child: true,
            waiting_for_sibling: true,
            sibling_chunks: VecDeque::new(),
            upstream,
        }));
        self.live += 1;
        log::debug!(target: "wt2html.accum", "node {} linked upstream={upstream:?}", id.0);
        id
    }

    pub fn is_live(&self, id: AccumId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    pub fn live_nodes(&self) -> usize {
        self.live
    }

    /// True while the node still waits for more sibling input.
    pub fn waiting_for_sibling(&self, id: AccumId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(node)) if node.waiting_for_sibling)
    }

    /// Routes `first` and every delivery it triggers. Chunks that leave the
    /// chain (target [`Upstream::Emit`]) are appended to `emitted` in order.
    pub fn deliver(
        &mut self,
        first: Delivery,
        ctx: &mut DocumentContext,
        emitted: &mut Vec<Chunk>,
    ) -> Result<(), StreamIntegrityError> {
        let mut work = VecDeque::new();
        work.push_back(first);
        while let Some(Delivery { target, chunk }) = work.pop_front() {
            match target {
                Upstream::Emit => emitted.push(chunk),
                Upstream::Child(id) => self.receive_from_child(id, chunk, ctx, &mut work)?,
                Upstream::Sibling(id) => self.receive_from_sibling(id, chunk, ctx, &mut work)?,
            }
        }
        Ok(())
    }

    /// Sibling input in the node's current wait state.
    pub fn append(&mut self, id: AccumId, chunk: Chunk) -> Delivery {
        let more = self.waiting_for_sibling(id);
        Delivery::new(Upstream::Sibling(id), chunk.with_async(more))
    }

    /// "No more sibling input" for `id`.
    pub fn sibling_done(id: AccumId) -> Delivery {
        Delivery::new(Upstream::Sibling(id), Chunk::end_signal())
    }

    fn stamp(
        &self,
        chunk: &mut Chunk,
        ctx: &mut DocumentContext,
    ) -> Result<(), StreamIntegrityError> {
        if chunk.rank.is_none() && !chunk.tokens.is_empty() {
            ctx.report_integrity(StreamIntegrityError::UnstampedRank {
                site: "accumulator",
            })?;
            chunk.rank = Some(self.phase_end);
        }
        Ok(())
    }

    fn receive_from_child(
        &mut self,
        id: AccumId,
        mut chunk: Chunk,
        ctx: &mut DocumentContext,
        work: &mut VecDeque<Delivery>,
    ) -> Result<(), StreamIntegrityError> {
        self.stamp(&mut chunk, ctx)?;
        let Some(node) = self.nodes.get_mut(id.0).and_then(Option::as_mut) else {
            log::error!(target: "wt2html.accum", "child delivery to retired node {}", id.0);
            return Ok(());
        };
        let more = chunk.async_mode;
        log::trace!(
            target: "wt2html.accum",
            "node {} <- child tokens={} more={more}",
            id.0,
            chunk.tokens.len()
        );

        if !more
            && node
                .sibling_chunks
                .front()
                .is_some_and(|first| first.rank == chunk.rank)
            && let Some(first) = node.sibling_chunks.pop_front()
        {
            chunk.tokens.extend(first.tokens);
        }

        let forward_more = more || node.waiting_for_sibling || !node.sibling_chunks.is_empty();
        work.push_back(Delivery::new(node.upstream, chunk.with_async(forward_more)));

        if !more {
            node.waiting_for_child = false;
            if !node.sibling_chunks.is_empty() {
                let waiting_for_sibling = node.waiting_for_sibling;
                Self::flush(node, waiting_for_sibling, work);
            }
        }
        self.retire_if_done(id);
        Ok(())
    }

    fn receive_from_sibling(
        &mut self,
        id: AccumId,
        mut chunk: Chunk,
        ctx: &mut DocumentContext,
        work: &mut VecDeque<Delivery>,
    ) -> Result<(), StreamIntegrityError> {
        self.stamp(&mut chunk, ctx)?;
        let Some(node) = self.nodes.get_mut(id.0).and_then(Option::as_mut) else {
            log::error!(target: "wt2html.accum", "sibling delivery to retired node {}", id.0);
            return Ok(());
        };
        let more = chunk.async_mode;
        log::trace!(
            target: "wt2html.accum",
            "node {} <- sibling tokens={} more={more}",
            id.0,
            chunk.tokens.len()
        );

        if !more {
            node.waiting_for_sibling = false;
        }
        if node.waiting_for_child {
            Self::buffer(node, chunk);
        } else if node.waiting_for_sibling {
            work.push_back(Delivery::new(node.upstream, chunk));
        } else {
            Self::buffer(node, chunk);
            Self::flush(node, false, work);
        }
        self.retire_if_done(id);
        Ok(())
    }

    /// Appends to the buffer; equal-rank neighbours merge.
    fn buffer(node: &mut AccumNode, chunk: Chunk) {
        if chunk.tokens.is_empty() {
            return;
        }
        match node.sibling_chunks.back_mut() {
            Some(last) if last.rank == chunk.rank => last.tokens.extend(chunk.tokens),
            _ => node.sibling_chunks.push_back(chunk.with_async(false)),
        }
    }

    /// Sends every buffered chunk upstream. All but the last carry
    /// more=true; the last carries `more`. An empty buffer still sends one
    /// empty chunk so the completion signal travels.
    fn flush(node: &mut AccumNode, more: bool, work: &mut VecDeque<Delivery>) {
        if node.sibling_chunks.is_empty() {
            work.push_back(Delivery::new(node.upstream, Chunk::end_signal().with_async(more)));
            return;
        }
        let count = node.sibling_chunks.len();
        for (i, chunk) in node.sibling_chunks.drain(..).enumerate() {
            let chunk_more = if i + 1 < count { true } else { more };
            work.push_back(Delivery::new(node.upstream, chunk.with_async(chunk_more)));
        }
    }

    fn retire_if_done(&mut self, id: AccumId) {
        let done = matches!(
            self.nodes.get(id.0),
            Some(Some(node))
                if !node.waiting_for_child
                    && !node.waiting_for_sibling
                    && node.sibling_chunks.is_empty()
        );
        if done {
            self.nodes[id.0] = None;
            self.live -= 1;
            log::debug!(target: "wt2html.accum", "node {} retired", id.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Token;

    fn text_chunk(texts: &[&str], rank: Rank, more: bool) -> Chunk {
        Chunk::ranked(texts.iter().map(|t| Token::text(*t)).collect(), rank).with_async(more)
    }

    fn flatten(chunks: &[Chunk]) -> Vec<Token> {
        chunks.iter().flat_map(|c| c.tokens.iter().cloned()).collect()
    }

    fn run(
        arena: &mut AccumArena,
        ctx: &mut DocumentContext,
        delivery: Delivery,
    ) -> Vec<Chunk> {
        let mut out = Vec::new();
        arena.deliver(delivery, ctx, &mut out).unwrap();
        out
    }

    #[test]
    fn child_tokens_pass_through_while_sibling_buffers() {
        let mut arena = AccumArena::new(Rank::PHASE2_END);
        let mut ctx = DocumentContext::default();
        let node = arena.add_node(Upstream::Emit);

        let out = run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Sibling(node), text_chunk(&["s1"], Rank::PHASE2_END, true)),
        );
        assert!(out.is_empty());

        let out = run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Child(node), text_chunk(&["c1"], Rank::PHASE2_END, true)),
        );
        assert_eq!(flatten(&out), vec![Token::text("c1")]);
        assert!(out[0].async_mode);
    }

    #[test]
    fn final_child_absorbs_equal_rank_sibling_chunk() {
        let mut arena = AccumArena::new(Rank::PHASE2_END);
        let mut ctx = DocumentContext::default();
        let node = arena.add_node(Upstream::Emit);

        run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Sibling(node), text_chunk(&["s1"], Rank::PHASE2_END, false)),
        );
        let out = run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Child(node), text_chunk(&["c1"], Rank::PHASE2_END, false)),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tokens, vec![Token::text("c1"), Token::text("s1")]);
        assert!(!out[0].async_mode);
        assert!(!arena.is_live(node));
    }

    #[test]
    fn differing_ranks_stay_separate() {
        let mut arena = AccumArena::new(Rank::PHASE2_END);
        let mut ctx = DocumentContext::default();
        let node = arena.add_node(Upstream::Emit);
        let low = Rank::new(1.5).unwrap();

        run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Sibling(node), text_chunk(&["a"], low, true)),
        );
        run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Sibling(node), text_chunk(&["b"], Rank::PHASE2_END, true)),
        );
        run(&mut arena, &mut ctx, AccumArena::sibling_done(node));
        let out = run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Child(node), text_chunk(&["c"], Rank::PHASE2_END, false)),
        );
        let ranks: Vec<_> = out.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![Some(Rank::PHASE2_END), Some(low), Some(Rank::PHASE2_END)]);
        let flags: Vec<_> = out.iter().map(|c| c.async_mode).collect();
        assert_eq!(flags, vec![true, true, false]);
        assert_eq!(
            flatten(&out),
            vec![Token::text("c"), Token::text("a"), Token::text("b")]
        );
    }

    #[test]
    fn sibling_forwards_directly_after_child_completes() {
        let mut arena = AccumArena::new(Rank::PHASE2_END);
        let mut ctx = DocumentContext::default();
        let node = arena.add_node(Upstream::Emit);

        let out = run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Child(node), text_chunk(&["c"], Rank::PHASE2_END, false)),
        );
        assert!(out[0].async_mode, "sibling side is still open");

        let out = run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Sibling(node), text_chunk(&["s"], Rank::PHASE2_END, true)),
        );
        assert_eq!(flatten(&out), vec![Token::text("s")]);
        assert!(out[0].async_mode);

        let out = run(&mut arena, &mut ctx, AccumArena::sibling_done(node));
        assert_eq!(out.len(), 1);
        assert!(out[0].tokens.is_empty());
        assert!(!out[0].async_mode);
        assert_eq!(arena.live_nodes(), 0);
    }

    #[test]
    fn chained_nodes_preserve_order() {
        // emit <- a; b is a's sibling chain.
        let mut arena = AccumArena::new(Rank::PHASE2_END);
        let mut ctx = DocumentContext::default();
        let a = arena.add_node(Upstream::Emit);
        let b = arena.add_node(Upstream::Sibling(a));

        let mut out = Vec::new();
        out.extend(run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Sibling(b), text_chunk(&["tail"], Rank::PHASE2_END, true)),
        ));
        out.extend(run(&mut arena, &mut ctx, AccumArena::sibling_done(b)));
        out.extend(run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Child(b), text_chunk(&["second"], Rank::PHASE2_END, false)),
        ));
        assert!(out.is_empty(), "a still waits for its child");
        out.extend(run(
            &mut arena,
            &mut ctx,
            Delivery::new(Upstream::Child(a), text_chunk(&["first"], Rank::PHASE2_END, false)),
        ));
        assert_eq!(
            flatten(&out),
            vec![Token::text("first"), Token::text("second"), Token::text("tail")]
        );
        assert!(!out.last().unwrap().async_mode);
        assert_eq!(arena.live_nodes(), 0);
    }

    #[test]
    fn unstamped_chunks_are_repaired() {
        let mut arena = AccumArena::new(Rank::PHASE2_END);
        let mut ctx = DocumentContext::default();
        let node = arena.add_node(Upstream::Emit);
        let out = run(
            &mut arena,
            &mut ctx,
            Delivery::new(
                Upstream::Child(node),
                Chunk::new(vec![Token::text("x")]).with_async(true),
            ),
        );
        assert_eq!(out[0].rank, Some(Rank::PHASE2_END));
        assert_eq!(ctx.diagnostics.len(), 1);
    }
}
