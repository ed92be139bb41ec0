use super::countries::country_code;
use super::{Baseline, ChangeLog, ChangeSet, MutationSequence};
use crate::core::{FixError, Result};
use crate::document::{FieldPath, JsonType};
use crate::filter::Filter;
use crate::mutator::{BatchFieldMutator, MalformedRecordPolicy};
use serde_json::{Value as JsonValue, json};
use std::fmt;
use std::str::FromStr;

pub const DECLARATIONS_COLLECTION: &str = "declarations";

/// Declarant whose declarations carry the wrong LRN.
pub const INCIDENT_EORI: &str = "GB072071145000";
pub const INCIDENT_LRN: &str = "QSLRN6499100";
pub const INCIDENT_REPLACEMENT_LRN: &str = "NEWLRN1234567";

const AUTHOR: &str = "exports-team";

/// The change logs shipped for the declarations store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShippedChangeLog {
    /// Location restructuring and incident fixes.
    #[default]
    Declarations,
    /// Fixes from before the location restructuring: declaration types
    /// and the LRN move to the document root.
    Legacy,
}

impl ShippedChangeLog {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Declarations => "declarations",
            Self::Legacy => "legacy",
        }
    }

    pub fn build(&self, policy: MalformedRecordPolicy) -> Result<ChangeLog> {
        match self {
            Self::Declarations => declarations_changelog(policy),
            Self::Legacy => legacy_declarations_changelog(policy),
        }
    }
}

impl FromStr for ShippedChangeLog {
    type Err = FixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "declarations" => Ok(Self::Declarations),
            "legacy" => Ok(Self::Legacy),
            other => Err(FixError::Config(format!(
                "change log must be 'declarations' or 'legacy', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ShippedChangeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every current change set for the declarations store, in application order.
///
/// `policy` decides what the fixes do with declarations lacking an `_id`.
pub fn declarations_changelog(policy: MalformedRecordPolicy) -> Result<ChangeLog> {
    ChangeLog::new()
        .with(ChangeSet::new(1, "Exports DB Baseline", AUTHOR, Baseline))?
        .with(ChangeSet::new(
            2,
            "CEDS-2231 Change country name to country code for location page",
            AUTHOR,
            goods_location_country_code()?.with_policy(policy),
        ))?
        .with(ChangeSet::new(
            3,
            "CEDS-2247 Change origination country structure",
            AUTHOR,
            country_code_restructure("locations.originationCountry")?.with_policy(policy),
        ))?
        .with(ChangeSet::new(
            4,
            "CEDS-2247 Change destination country structure",
            AUTHOR,
            country_code_restructure("locations.destinationCountry")?.with_policy(policy),
        ))?
        .with(ChangeSet::new(
            5,
            "CEDS-2247 Change routing countries structure",
            AUTHOR,
            routing_countries_restructure()?.with_policy(policy),
        ))?
        .with(ChangeSet::new(
            6,
            "CEDS-2473 Replace LRN on misfiled declarations",
            AUTHOR,
            incident_lrn_fix()?.with_policy(policy),
        ))
}

/// Change sets from before the location restructuring.
pub fn legacy_declarations_changelog(policy: MalformedRecordPolicy) -> Result<ChangeLog> {
    ChangeLog::new()
        .with(ChangeSet::new(
            1,
            "CEDS-2111 Change declaration types to APPLES",
            AUTHOR,
            declaration_type_fix()?.with_policy(policy),
        ))?
        .with(ChangeSet::new(
            2,
            "CEDS-2111 Move LRN to root of document",
            AUTHOR,
            lrn_to_root(policy)?,
        ))
}

fn declaration_type_fix() -> Result<BatchFieldMutator> {
    let filter = Filter::new().eq("type", "STANDARD")?;
    BatchFieldMutator::new(DECLARATIONS_COLLECTION, filter, "additionalDeclarationType", "APPLES")
}

/// Copies `consignmentReferences.lrn` to `lrn`, then removes the original.
fn lrn_to_root(policy: MalformedRecordPolicy) -> Result<MutationSequence> {
    const NESTED: &str = "consignmentReferences.lrn";
    let nested = FieldPath::parse(NESTED)?;

    let copy = BatchFieldMutator::derived(
        DECLARATIONS_COLLECTION,
        Filter::new().exists(NESTED)?,
        "lrn",
        move |record| record.get(&nested).cloned(),
    )?;
    let remove =
        BatchFieldMutator::unset(DECLARATIONS_COLLECTION, Filter::new().exists(NESTED)?, NESTED)?;

    MutationSequence::new(vec![copy.with_policy(policy), remove.with_policy(policy)])
}

/// Replaces a full country name with its code. Unknown names are kept.
fn goods_location_country_code() -> Result<BatchFieldMutator> {
    const PATH: &str = "locations.goodsLocation.country";
    let filter = Filter::new()
        .exists(PATH)?
        .has_type(PATH, JsonType::String)?
        .ne(PATH, "")?
        .matches_pattern(PATH, "^.{3,}$")?;
    let field = FieldPath::parse(PATH)?;

    BatchFieldMutator::derived(DECLARATIONS_COLLECTION, filter, PATH, move |record| {
        record
            .get_str(&field)
            .map(|name| json!(country_code(name).unwrap_or(name)))
    })
}

/// Turns a plain country string into `{"code": <country>}`.
fn country_code_restructure(path: &str) -> Result<BatchFieldMutator> {
    let filter = Filter::new()
        .exists(path)?
        .has_type(path, JsonType::String)?
        .ne(path, "")?;
    let field = FieldPath::parse(path)?;

    BatchFieldMutator::derived(DECLARATIONS_COLLECTION, filter, path, move |record| {
        record.get_str(&field).map(|code| json!({ "code": code }))
    })
}

/// Turns `["FR", "DE"]` into `[{"code": "FR"}, {"code": "DE"}]`.
fn routing_countries_restructure() -> Result<BatchFieldMutator> {
    const PATH: &str = "locations.routingCountries";
    let filter = Filter::new()
        .no_elem_match(PATH, Filter::new().exists("code")?)?
        .exists(PATH)?
        .has_type(PATH, JsonType::Array)?;
    let field = FieldPath::parse(PATH)?;

    BatchFieldMutator::derived(DECLARATIONS_COLLECTION, filter, PATH, move |record| {
        let countries = record.get(&field)?.as_array()?;
        countries
            .iter()
            .map(|country| country.as_str().map(|code| json!({ "code": code })))
            .collect::<Option<Vec<JsonValue>>>()
            .map(JsonValue::Array)
    })
}

fn incident_lrn_fix() -> Result<BatchFieldMutator> {
    let filter = Filter::new()
        .eq("eori", INCIDENT_EORI)?
        .eq("consignmentReferences.lrn", INCIDENT_LRN)?;
    BatchFieldMutator::new(
        DECLARATIONS_COLLECTION,
        filter,
        "consignmentReferences.lrn",
        INCIDENT_REPLACEMENT_LRN,
    )
}
