//! Intrusive linked lists in kernel memory
//!
//! Kernel lists (`LIST_HEAD`/`LIST_ENTRY`) thread a "next" pointer through
//! each element. Nodes are never dereferenced in place: each one is copied out
//! whole, and the next pointer is taken from that copy.

use crate::error::Result;
use crate::layout::u64_at;
use crate::source::MemorySource;

/// A node copied out of a foreign list
#[derive(Debug, Clone)]
pub struct ForeignNode {
    /// Kernel address of the node
    pub address: u64,
    /// Copy of the node's record
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    /// Address of a list head whose first pointer has not been read yet
    Head(u64),
    /// Address of the next node (0 terminates)
    Node(u64),
    Done,
}

/// Iterator over the nodes of a list living in kernel memory
///
/// The walk follows whatever pointers it finds. There is no cycle detection:
/// a list that is corrupt, or that the running kernel rewrites while it is
/// being read, can make the walk run forever. The first failed read is
/// returned as an error and ends the walk.
pub struct ForeignList<'a> {
    source: &'a dyn MemorySource,
    cursor: Cursor,
    link_offset: usize,
    node_size: usize,
}

impl<'a> ForeignList<'a> {
    /// Walk the list whose head is stored at `head_address`
    pub fn from_head(
        source: &'a dyn MemorySource,
        head_address: u64,
        link_offset: usize,
        node_size: usize,
    ) -> Self {
        Self::new(source, Cursor::Head(head_address), link_offset, node_size)
    }

    /// Walk a list whose first element pointer was already copied out
    pub fn starting_at(
        source: &'a dyn MemorySource,
        first: u64,
        link_offset: usize,
        node_size: usize,
    ) -> Self {
        Self::new(source, Cursor::Node(first), link_offset, node_size)
    }

    fn new(
        source: &'a dyn MemorySource,
        cursor: Cursor,
        link_offset: usize,
        node_size: usize,
    ) -> Self {
        debug_assert!(link_offset + 8 <= node_size);
        ForeignList {
            source,
            cursor,
            link_offset,
            node_size,
        }
    }

    fn step(&mut self) -> Result<Option<ForeignNode>> {
        let address = match self.cursor {
            Cursor::Done => return Ok(None),
            Cursor::Head(head) => self.source.read_ptr(head)?,
            Cursor::Node(address) => address,
        };
        if address == 0 {
            self.cursor = Cursor::Done;
            return Ok(None);
        }

        let data = self.source.read_bytes(address, self.node_size)?;
        self.cursor = Cursor::Node(u64_at(&data, self.link_offset));
        tracing::trace!("List node at {:#x}", address);

        Ok(Some(ForeignNode { address, data }))
    }
}

impl Iterator for ForeignList<'_> {
    type Item = Result<ForeignNode>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(Some(node)) => Some(Ok(node)),
            Ok(None) => None,
            Err(e) => {
                self.cursor = Cursor::Done;
                Some(Err(e))
            }
        }
    }
}
