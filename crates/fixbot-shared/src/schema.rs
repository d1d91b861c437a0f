//! Field schema resolution: from a workflow rule to the ordered list of
//! fields a ticket must collect.
//!
//! The output order is a contract. It is both the dependency order the
//! next-step finder walks and the presentation order of the rendered
//! message, and it is deterministic for a given rule.

use crate::field::{
    ChoiceOption, FieldDefinition, FieldKey, FieldKind, LocationRole, LookupSource, Priority,
};
use crate::rule::{AdditionalFieldKind, WorkflowRule};

fn category_field() -> FieldDefinition {
    FieldDefinition {
        key: FieldKey::Category,
        label: "Category".to_string(),
        kind: FieldKind::Lookup(LookupSource::Categories),
        depends_on: vec![],
    }
}

fn priority_field() -> FieldDefinition {
    let options = Priority::ALL
        .iter()
        .map(|p| ChoiceOption::new(p.as_str(), p.label()))
        .collect();
    FieldDefinition {
        key: FieldKey::Priority,
        label: "Priority".to_string(),
        kind: FieldKind::Choice(options),
        depends_on: vec![FieldKey::Category],
    }
}

fn location_field(role: LocationRole, label: &str) -> FieldDefinition {
    FieldDefinition {
        key: role.field_key(),
        label: label.to_string(),
        kind: FieldKind::Tree(role),
        depends_on: vec![FieldKey::Category, FieldKey::Priority],
    }
}

/// Resolve the ordered field schema for a category.
///
/// Always starts `[category, priority]`. Without a chosen category it stops
/// there. With a category but no rule (never configured, or deleted
/// mid-session) it degrades to the default single-location schema. With a
/// rule, fields follow in fixed precedence: subcategory, locations
/// (source/target win over plain), agency then agency date, then one entry
/// per additional field.
pub fn required_fields(
    category_id: Option<&str>,
    rule: Option<&WorkflowRule>,
) -> Vec<FieldDefinition> {
    let mut fields = vec![category_field(), priority_field()];

    if category_id.is_none() {
        return fields;
    }

    let Some(rule) = rule else {
        fields.push(location_field(LocationRole::Plain, "Location"));
        return fields;
    };

    if rule.has_subcategories {
        fields.push(FieldDefinition {
            key: FieldKey::Subcategory,
            label: "Subcategory".to_string(),
            kind: FieldKind::Lookup(LookupSource::Subcategories),
            depends_on: vec![FieldKey::Category],
        });
    }

    if rule.wants_directional_locations() {
        fields.push(location_field(LocationRole::Source, "From location"));
        fields.push(location_field(LocationRole::Target, "To location"));
    } else if rule.requires_location {
        fields.push(location_field(LocationRole::Plain, "Location"));
    }

    if rule.requires_agency {
        fields.push(FieldDefinition {
            key: FieldKey::Agency,
            label: "Agency".to_string(),
            kind: FieldKind::Lookup(LookupSource::Agencies),
            depends_on: vec![FieldKey::Category, FieldKey::Priority],
        });
        if rule.requires_agency_date {
            fields.push(FieldDefinition {
                key: FieldKey::AgencyDate,
                label: "Agency date".to_string(),
                kind: FieldKind::Date,
                depends_on: vec![FieldKey::Agency],
            });
        }
    }

    for def in &rule.additional_fields {
        let kind = match def.kind {
            AdditionalFieldKind::Text => FieldKind::FreeText,
            AdditionalFieldKind::Date => FieldKind::Date,
            AdditionalFieldKind::Choice => FieldKind::Choice(def.options.clone()),
        };
        fields.push(FieldDefinition {
            key: FieldKey::Extra(def.key.clone()),
            label: def.label.clone(),
            kind,
            depends_on: vec![FieldKey::Category, FieldKey::Priority],
        });
    }

    fields
}

/// Look up one field's definition within the resolved schema.
pub fn field_definition(
    category_id: Option<&str>,
    rule: Option<&WorkflowRule>,
    key: &FieldKey,
) -> Option<FieldDefinition> {
    required_fields(category_id, rule)
        .into_iter()
        .find(|def| &def.key == key)
}
