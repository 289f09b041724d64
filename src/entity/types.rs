use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Entity type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Equipment,
    Manufacturer,
    PartNumber,
    FaultCode,
    Measurement,
    StockStatus,
    Urgency,
    DocType,
    Other,
}

impl EntityType {
    pub const ALL: [EntityType; 9] = [
        EntityType::Equipment,
        EntityType::Manufacturer,
        EntityType::PartNumber,
        EntityType::FaultCode,
        EntityType::Measurement,
        EntityType::StockStatus,
        EntityType::Urgency,
        EntityType::DocType,
        EntityType::Other,
    ];

    /// Structured identifier-like types that anchor a query on their own.
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            EntityType::PartNumber | EntityType::FaultCode | EntityType::Measurement
        )
    }

    /// Short description of the type, used when delegating gap text to the
    /// language-understanding service.
    pub fn description(&self) -> &'static str {
        match self {
            EntityType::Equipment => {
                "A physical component or assembly of machinery (e.g. fuel filter, turbocharger)"
            }
            EntityType::Manufacturer => {
                "A maker or brand of equipment or parts (e.g. MTU, Caterpillar)"
            }
            EntityType::PartNumber => {
                "A catalog or part identifier (e.g. MTU-4000-1234, 0081837301)"
            }
            EntityType::FaultCode => "A diagnostic or fault code (e.g. SPN 3216, E-047)",
            EntityType::Measurement => "A numeric value with a unit (e.g. 24 V, 3.5 bar)",
            EntityType::StockStatus => {
                "An inventory availability state (e.g. out of stock, on backorder)"
            }
            EntityType::Urgency => "An urgency or priority marker (e.g. critical, asap)",
            EntityType::DocType => "A document kind (e.g. service manual, wiring diagram)",
            EntityType::Other => "Any other salient term that identifies what the user wants",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Equipment => write!(f, "EQUIPMENT"),
            EntityType::Manufacturer => write!(f, "MANUFACTURER"),
            EntityType::PartNumber => write!(f, "PART_NUMBER"),
            EntityType::FaultCode => write!(f, "FAULT_CODE"),
            EntityType::Measurement => write!(f, "MEASUREMENT"),
            EntityType::StockStatus => write!(f, "STOCK_STATUS"),
            EntityType::Urgency => write!(f, "URGENCY"),
            EntityType::DocType => write!(f, "DOC_TYPE"),
            EntityType::Other => write!(f, "OTHER"),
        }
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "EQUIPMENT" => EntityType::Equipment,
            "MANUFACTURER" => EntityType::Manufacturer,
            "PART_NUMBER" => EntityType::PartNumber,
            "FAULT_CODE" => EntityType::FaultCode,
            "MEASUREMENT" => EntityType::Measurement,
            "STOCK_STATUS" => EntityType::StockStatus,
            "URGENCY" => EntityType::Urgency,
            "DOC_TYPE" => EntityType::DocType,
            _ => EntityType::Other,
        }
    }
}

/// Where an entity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntitySource {
    Pattern,
    Gazetteer,
    ProperNoun,
    Probabilistic,
}

impl EntitySource {
    /// Priority used for deterministic ordering and merge tie-breaks.
    /// Higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            EntitySource::Pattern => 3,
            EntitySource::Gazetteer => 2,
            EntitySource::ProperNoun => 1,
            EntitySource::Probabilistic => 0,
        }
    }
}

impl fmt::Display for EntitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntitySource::Pattern => write!(f, "pattern"),
            EntitySource::Gazetteer => write!(f, "gazetteer"),
            EntitySource::ProperNoun => write!(f, "proper_noun"),
            EntitySource::Probabilistic => write!(f, "probabilistic"),
        }
    }
}

/// Byte span into the normalized query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// A typed, confidence-scored span extracted from the normalized query text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    // Entity text as it appears in the normalized query
    pub text: String,

    // Entity type (equipment, manufacturer, part number, etc.)
    pub entity_type: EntityType,

    // Byte offsets into the normalized query text
    pub span: Span,

    // Confidence after source multiplier, 0.0 to 1.0
    pub confidence: f32,

    // Which matcher produced this entity
    pub source: EntitySource,
}

impl Entity {
    pub fn new(
        text: &str,
        entity_type: EntityType,
        span: Span,
        confidence: f32,
        source: EntitySource,
    ) -> Self {
        Entity {
            text: text.to_string(),
            entity_type,
            span,
            confidence,
            source,
        }
    }
}

/// Wall-clock time spent in each pipeline stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub normalize: Duration,
    pub deterministic: Duration,
    pub coverage: Duration,
    pub probabilistic: Duration,
    pub merge: Duration,
    pub total: Duration,
}

/// Final output of the extraction pipeline. Never altered after construction.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    // The normalized query text all entity spans index into
    pub normalized_text: String,

    // Final merged entities, sorted by span start then source priority
    pub entities: Vec<Entity>,

    // Per-stage timings for observability
    pub timings: StageTimings,

    // Pre-merge candidates, kept only when tracing is enabled
    pub premerge: Option<Vec<Entity>>,

    // Whether the entity set was served from the extraction cache
    pub from_cache: bool,
}

impl ExtractionResult {
    pub fn entities_of_type(&self, entity_type: EntityType) -> Vec<&Entity> {
        self.entities
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .collect()
    }
}
