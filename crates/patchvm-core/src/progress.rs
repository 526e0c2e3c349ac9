/// Denominator reported when the patch size is unknown.
pub const NOMINAL_TOTAL: u64 = 4096;

const APPROACH_DIVISOR: u64 = 100;

/// Progress of one patch download.
///
/// With a known size, progress is the number of bytes copied. Without one,
/// every chunk moves the counter a hundredth of the remaining distance to
/// [`NOMINAL_TOTAL`]; the counter never gets there before the stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    total: Option<u64>,
    bytes: u64,
    nominal: u64,
    finished: bool,
}

impl DownloadProgress {
    /// A zero size hint counts as unknown.
    #[must_use]
    pub fn new(size_hint: Option<u64>) -> Self {
        Self {
            total: size_hint.filter(|size| *size > 0),
            bytes: 0,
            nominal: 0,
            finished: false,
        }
    }

    #[must_use]
    pub fn is_size_known(&self) -> bool {
        self.total.is_some()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.unwrap_or(NOMINAL_TOTAL)
    }

    /// Progress value to report, never above [`total`](Self::total) and equal
    /// to it once [`finish`](Self::finish) was called.
    #[must_use]
    pub fn done(&self) -> u64 {
        if self.finished {
            return self.total();
        }
        match self.total {
            Some(total) => self.bytes.min(total),
            None => self.nominal,
        }
    }

    /// Bytes actually copied so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.done() >= self.total()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        self.done() as f64 / self.total() as f64
    }

    pub fn advance(&mut self, chunk_len: usize) {
        self.bytes += chunk_len as u64;
        if self.total.is_none() {
            self.nominal += (NOMINAL_TOTAL - self.nominal) / APPROACH_DIVISOR;
        }
    }

    /// Mark the stream as exhausted. [`bytes`](Self::bytes) keeps the count
    /// actually copied, even when it falls short of the announced size.
    pub fn finish(&mut self) {
        self.finished = true;
    }
}
