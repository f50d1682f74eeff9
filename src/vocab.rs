//! Predicate and type identifiers with fixed meaning in the graph

/// Links a resource to its entity type
pub const RDF_TYPE: &str = "rdf:type";

/// Type of unordered collection nodes
pub const RDF_BAG: &str = "rdf:Bag";

/// Links a collection node to each of its members
pub const RDF_MEMBER: &str = "rdf:li";

/// Type of partition descriptions in the description fact-set
pub const PARTITION: &str = "tg:Partition";

pub const START_YEAR: &str = "tg:startYear";
pub const START_MONTH: &str = "tg:startMonth";
pub const START_DAY: &str = "tg:startDay";
pub const DURATION_YEARS: &str = "tg:durationYears";
pub const DURATION_MONTHS: &str = "tg:durationMonths";
pub const DURATION_DAYS: &str = "tg:durationDays";
