//! Entity extractor: unified business-entity view of one cycle.
//!
//! Two upstreams answer with structurally different payloads. The external
//! protocol endpoint speaks the German insurer schema
//! (`data.Mieter.Vorname` etc.); the tenancy acceptor answers with its own
//! camelCase shape (`applicant.firstName`, `address.zipCode`). Each shape
//! gets its own serde record and parser, both producing the same partial
//! entity view, merged field-by-field with first-wins precedence.
//!
//! Extraction is best-effort and non-authoritative: a malformed payload is
//! logged and skipped, never fatal for the cycle. Empty strings mean
//! "not available".

use serde::{Deserialize, Serialize};

use trace_types::{decode_response_body, StepKind, TraceEvent, PROTOCOL_DATA_PATH};

use super::step_kind;

/// Best-effort view of one party (tenant or landlord).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusinessEntity {
    pub name: String,
    pub address: String,
    pub token: String,
}

/// Entities extracted from one cycle's steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleEntities {
    pub tenant: BusinessEntity,
    pub landlord: BusinessEntity,
}

impl CycleEntities {
    /// The cycle's correlation token, wherever it was found first.
    pub fn token(&self) -> &str {
        if !self.tenant.token.is_empty() {
            &self.tenant.token
        } else {
            &self.landlord.token
        }
    }
}

/// Partial entity produced by one parser; merged first-wins into the view.
#[derive(Debug, Default)]
struct EntityPartial {
    name: Option<String>,
    address: Option<String>,
    token: Option<String>,
}

/// Extract tenant, landlord and correlation token from a cycle's steps.
///
/// Steps are iterated in chronological order (guaranteed by the
/// reconstructor), so first-wins merging means the protocol-data values
/// take precedence over whatever the acceptor echoes back.
pub fn extract(steps: &[TraceEvent]) -> CycleEntities {
    let mut entities = CycleEntities::default();

    for event in steps {
        match step_kind(event) {
            StepKind::ProtocolFetch => apply_protocol_fetch(&mut entities, event),
            StepKind::TenancySubmit => apply_tenancy_submit(&mut entities, event),
            _ => {}
        }
    }

    entities
}

// ============================================================================
// Protocol-data schema (external insurer upstream)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ProtocolDataBody {
    #[serde(default)]
    data: Option<ProtocolParties>,
}

#[derive(Debug, Deserialize)]
struct ProtocolParties {
    #[serde(rename = "Mieter", default)]
    tenant: Option<ProtocolParty>,
    #[serde(rename = "Vermieter", default)]
    landlord: Option<ProtocolParty>,
}

#[derive(Debug, Default, Deserialize)]
struct ProtocolParty {
    #[serde(rename = "Vorname", default)]
    first_name: Option<String>,
    #[serde(rename = "Name", default)]
    family_name: Option<String>,
    #[serde(rename = "Strasse", default)]
    street: Option<String>,
    #[serde(rename = "Hausnummer", default)]
    house_number: Option<String>,
    #[serde(rename = "Plz", default)]
    zip: Option<String>,
    #[serde(rename = "Ort", default)]
    city: Option<String>,
}

impl ProtocolParty {
    fn to_partial(&self, token: Option<&str>) -> EntityPartial {
        EntityPartial {
            name: compose_name(self.first_name.as_deref(), self.family_name.as_deref()),
            address: compose_address(
                self.street.as_deref(),
                self.house_number.as_deref(),
                self.zip.as_deref(),
                self.city.as_deref(),
            ),
            token: token.map(ToString::to_string),
        }
    }
}

fn apply_protocol_fetch(entities: &mut CycleEntities, event: &TraceEvent) {
    let token = event.url.as_deref().and_then(token_from_protocol_url);

    let Some(body) = event.response_body.as_ref() else {
        merge_token_only(entities, token.as_deref());
        return;
    };
    let Some(decoded) = decode_response_body(body) else {
        tracing::warn!(
            request_id = %event.request_id,
            "Unparseable protocol-data response body; skipping entity extraction for this step"
        );
        merge_token_only(entities, token.as_deref());
        return;
    };

    match serde_json::from_value::<ProtocolDataBody>(decoded) {
        Ok(parsed) => {
            let parties = parsed.data.unwrap_or(ProtocolParties {
                tenant: None,
                landlord: None,
            });
            let tenant_partial = parties
                .tenant
                .unwrap_or_default()
                .to_partial(token.as_deref());
            let landlord_partial = parties
                .landlord
                .unwrap_or_default()
                .to_partial(token.as_deref());
            merge(&mut entities.tenant, tenant_partial);
            merge(&mut entities.landlord, landlord_partial);
        }
        Err(e) => {
            tracing::warn!(
                request_id = %event.request_id,
                error = %e,
                "Protocol-data response did not match the expected schema"
            );
            merge_token_only(entities, token.as_deref());
        }
    }
}

/// Token is the URL path segment following the protocol-data prefix.
fn token_from_protocol_url(url: &str) -> Option<String> {
    let start = url.find(PROTOCOL_DATA_PATH)? + PROTOCOL_DATA_PATH.len();
    let rest = &url[start..];
    let end = rest
        .find(|c| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    let token = &rest[..end];
    (!token.is_empty()).then(|| token.to_string())
}

// ============================================================================
// Tenancy-submission schema (acceptor downstream)
// ============================================================================

#[derive(Debug, Deserialize)]
struct SubmissionBody {
    #[serde(default)]
    cid: Option<String>,
    #[serde(default)]
    applicant: Option<SubmissionParty>,
    #[serde(default)]
    landlord: Option<SubmissionParty>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmissionParty {
    #[serde(rename = "firstName", default)]
    first_name: Option<String>,
    #[serde(rename = "lastName", default)]
    last_name: Option<String>,
    #[serde(default)]
    address: Option<SubmissionAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmissionAddress {
    #[serde(default)]
    street: Option<String>,
    #[serde(rename = "houseNumber", default)]
    house_number: Option<String>,
    #[serde(rename = "zipCode", default)]
    zip_code: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

impl SubmissionParty {
    fn to_partial(&self, token: Option<&str>) -> EntityPartial {
        let address = self.address.as_ref().and_then(|addr| {
            compose_address(
                addr.street.as_deref(),
                addr.house_number.as_deref(),
                addr.zip_code.as_deref(),
                addr.city.as_deref(),
            )
        });
        EntityPartial {
            name: compose_name(self.first_name.as_deref(), self.last_name.as_deref()),
            address,
            token: token.map(ToString::to_string),
        }
    }
}

fn apply_tenancy_submit(entities: &mut CycleEntities, event: &TraceEvent) {
    let Some(body) = event.response_body.as_ref() else {
        return;
    };
    let Some(decoded) = decode_response_body(body) else {
        tracing::warn!(
            request_id = %event.request_id,
            "Unparseable tenancy-submission response body; skipping entity extraction for this step"
        );
        return;
    };

    match serde_json::from_value::<SubmissionBody>(decoded) {
        Ok(parsed) => {
            let cid = parsed.cid.as_deref();
            let applicant_partial = parsed
                .applicant
                .unwrap_or_default()
                .to_partial(cid);
            let landlord_partial = parsed
                .landlord
                .unwrap_or_default()
                .to_partial(cid);
            merge(&mut entities.tenant, applicant_partial);
            merge(&mut entities.landlord, landlord_partial);
        }
        Err(e) => {
            tracing::warn!(
                request_id = %event.request_id,
                error = %e,
                "Tenancy-submission response did not match the expected schema"
            );
        }
    }
}

// ============================================================================
// Merging
// ============================================================================

/// First-wins merge: later events never overwrite a populated field.
fn merge(target: &mut BusinessEntity, partial: EntityPartial) {
    merge_field(&mut target.name, partial.name);
    merge_field(&mut target.address, partial.address);
    merge_field(&mut target.token, partial.token);
}

fn merge_field(target: &mut String, candidate: Option<String>) {
    if target.is_empty() {
        if let Some(value) = candidate.filter(|v| !v.is_empty()) {
            *target = value;
        }
    }
}

fn merge_token_only(entities: &mut CycleEntities, token: Option<&str>) {
    merge_field(&mut entities.tenant.token, token.map(ToString::to_string));
    merge_field(&mut entities.landlord.token, token.map(ToString::to_string));
}

fn compose_name(first: Option<&str>, family: Option<&str>) -> Option<String> {
    let joined = [first, family]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

/// Street + number, then "zip city", joined with a comma when both exist.
fn compose_address(
    street: Option<&str>,
    number: Option<&str>,
    zip: Option<&str>,
    city: Option<&str>,
) -> Option<String> {
    let street_part = [street, number]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let locality_part = [zip, city]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let joined = match (street_part.is_empty(), locality_part.is_empty()) {
        (false, false) => format!("{street_part}, {locality_part}"),
        (false, true) => street_part,
        (true, false) => locality_part,
        (true, true) => return None,
    };
    Some(joined)
}
