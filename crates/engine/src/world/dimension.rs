/// Vertical extent of a dimension, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YRange {
    pub min: i64,
    pub max: i64,
}

impl YRange {
    pub const fn contains(&self, y: i64) -> bool {
        y >= self.min && y <= self.max
    }

    pub const fn height(&self) -> i64 {
        self.max - self.min + 1
    }
}

/// Simulation rules a world runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dimension {
    #[default]
    Overworld,
    Nether,
    End,
}

impl Dimension {
    pub const fn range(self) -> YRange {
        match self {
            Dimension::Overworld => YRange { min: -64, max: 319 },
            Dimension::Nether => YRange { min: 0, max: 255 },
            Dimension::End => YRange { min: 0, max: 255 },
        }
    }

    pub const fn has_sky(self) -> bool {
        matches!(self, Dimension::Overworld | Dimension::End)
    }

    /// Whether the day/night clock runs in this dimension.
    pub const fn time_cycle(self) -> bool {
        matches!(self, Dimension::Overworld)
    }

    pub const fn has_weather(self) -> bool {
        matches!(self, Dimension::Overworld)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Dimension::Overworld => "overworld",
            Dimension::Nether => "nether",
            Dimension::End => "end",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "overworld" => Some(Dimension::Overworld),
            "nether" => Some(Dimension::Nether),
            "end" => Some(Dimension::End),
            _ => None,
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
