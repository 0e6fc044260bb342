#[derive(Debug, Clone, Default)]
pub enum BarColor {
    #[default]
    CYAN,
    MAGENTA,
    GREEN,
}

/// The pipeline step a status message refers to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Annotate,
    Clean,
    Merge,
}

impl Stage {
    pub fn color(&self) -> BarColor {
        match self {
            Self::Annotate => BarColor::CYAN,
            Self::Clean => BarColor::MAGENTA,
            Self::Merge => BarColor::GREEN,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Annotate => "Annotating",
            Self::Clean => "Cleaning",
            Self::Merge => "Merging",
        }
    }
}

/// Progress message sent from the pipeline to whoever is drawing progress
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub stage: Stage,
    pub label: String,
}

impl WorkerStatus {
    pub fn new(progress: f32, stage: Stage, label: String) -> Self {
        Self {
            progress,
            stage,
            label,
        }
    }
}
