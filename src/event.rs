//! Detection events exchanged between sensing pipelines and aggregators.

/// Which sensing pipeline produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Vision,
    Audio,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::Vision => "vision",
            Source::Audio => "audio",
        }
    }
}

/// One pipeline's verdict for one processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionEvent {
    pub source: Source,
    pub detected: bool,
}

impl DetectionEvent {
    pub fn positive(source: Source) -> Self {
        Self {
            source,
            detected: true,
        }
    }

    pub fn negative(source: Source) -> Self {
        Self {
            source,
            detected: false,
        }
    }
}
