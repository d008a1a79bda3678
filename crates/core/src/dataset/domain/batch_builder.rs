use crate::shared::image_item::ImageItem;

/// A size-bounded group of images sent to the backend together.
///
/// `total_bytes <= max_request_size` unless the batch holds a single item
/// that is larger than the limit on its own (`oversized`).
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    items: Vec<ImageItem>,
    total_bytes: u64,
    oversized: bool,
}

impl Batch {
    pub fn new(items: Vec<ImageItem>, max_request_size: u64) -> Self {
        let total_bytes = items.iter().map(|item| item.byte_size).sum();
        let oversized = items.len() == 1 && total_bytes > max_request_size;
        Self {
            items,
            total_bytes,
            oversized,
        }
    }

    pub fn items(&self) -> &[ImageItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ImageItem> {
        self.items
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn oversized(&self) -> bool {
        self.oversized
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One-pass greedy packer: items are appended to the open batch until the
/// next one would push it over `max_request_size`, at which point the open
/// batch is closed and the item starts a new one. Item order is preserved.
///
/// An item larger than the limit ends up alone, because whatever follows it
/// cannot fit next to it.
pub struct BatchBuilder {
    max_request_size: u64,
    current: Vec<ImageItem>,
    current_bytes: u64,
}

impl BatchBuilder {
    pub fn new(max_request_size: u64) -> Self {
        Self {
            max_request_size,
            current: Vec::new(),
            current_bytes: 0,
        }
    }

    pub fn max_request_size(&self) -> u64 {
        self.max_request_size
    }

    /// Adds an item, returning the previous batch if this item closed it.
    pub fn push(&mut self, item: ImageItem) -> Option<Batch> {
        let closed = if !self.current.is_empty()
            && self.current_bytes.saturating_add(item.byte_size) > self.max_request_size
        {
            self.take_current()
        } else {
            None
        };

        self.current_bytes = self.current_bytes.saturating_add(item.byte_size);
        self.current.push(item);
        closed
    }

    /// Closes and returns the open batch, if any.
    pub fn finish(&mut self) -> Option<Batch> {
        self.take_current()
    }

    fn take_current(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            return None;
        }
        self.current_bytes = 0;
        let items = std::mem::take(&mut self.current);
        let batch = Batch::new(items, self.max_request_size);
        if batch.oversized() {
            log::warn!(
                "{} is {} bytes, over the {} byte request limit; sending it alone",
                batch.items()[0].path.display(),
                batch.total_bytes(),
                self.max_request_size
            );
        }
        Some(batch)
    }
}

/// Streaming adapter turning an item sequence into a batch sequence.
pub struct Batches<I> {
    items: I,
    builder: BatchBuilder,
    done: bool,
}

pub fn batches<I>(items: I, max_request_size: u64) -> Batches<I>
where
    I: Iterator<Item = ImageItem>,
{
    Batches {
        items,
        builder: BatchBuilder::new(max_request_size),
        done: false,
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = ImageItem>,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.done {
            return None;
        }
        for item in self.items.by_ref() {
            if let Some(batch) = self.builder.push(item) {
                return Some(batch);
            }
        }
        self.done = true;
        self.builder.finish()
    }
}
