//! Attribute mapping between host attribute sets and Box JSON.
//!
//! Mapping is strict: unknown attributes, wrong value types and multiple
//! values for a single-valued attribute are rejected rather than dropped.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::operation::{
    AttributeDelta, AttributeDeltaSet, AttributeSet, AttributeValue, ConnectorObject, Name, Uid,
};
use xavyo_connector::schema::AttributeDataType;

use crate::membership::MembershipEdge;
use crate::schema::{AttributeDefinition, Binding, ObjectClassSchema, Projection};

/// Box status values for `__ENABLE__`.
const STATUS_ACTIVE: &str = "active";
const STATUS_INACTIVE: &str = "inactive";

/// One user or group as returned by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResource(Map<String, Value>);

impl RemoteResource {
    pub fn from_value(value: Value) -> ConnectorResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ConnectorError::Serialization {
                message: format!("expected a JSON object, got {other}"),
            }),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }
}

/// Body of a create call plus the work that has to follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePayload {
    pub body: Map<String, Value>,
    /// Value of the identity field (login or group name).
    pub name: String,
    /// Group ids the new user should be added to once it exists.
    pub memberships: Vec<String>,
}

/// How an update changes a user's group memberships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    /// Add and remove individual groups.
    Partial { add: Vec<String>, remove: Vec<String> },
    /// Make the memberships exactly this set.
    Replace(Vec<String>),
}

/// Everything one `update_delta` call has to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePlan {
    /// Fields for the resource's `PUT`, identity included when it changes.
    pub payload: Map<String, Value>,
    /// New identity value, when `__NAME__` is replaced.
    pub identity: Option<String>,
    pub memberships: Option<MembershipChange>,
}

/// Translates between host attributes and the JSON of one object class.
#[derive(Debug, Clone, Copy)]
pub struct AttributeMapper<'s> {
    schema: &'s ObjectClassSchema,
}

impl<'s> AttributeMapper<'s> {
    pub fn new(schema: &'s ObjectClassSchema) -> Self {
        Self { schema }
    }

    fn definition(&self, name: &str) -> ConnectorResult<&'s AttributeDefinition> {
        self.schema.definition(name).ok_or_else(|| {
            ConnectorError::invalid_attribute(
                name,
                format!("unknown attribute for {}", self.schema.class().host_name()),
            )
        })
    }

    /// Build the body of a create call.
    pub fn to_create_payload(&self, attributes: &AttributeSet) -> ConnectorResult<CreatePayload> {
        let mut body = Map::new();
        let mut memberships = Vec::new();

        for (name, values) in attributes.iter() {
            let definition = self.definition(name)?;
            if !definition.creatable {
                return Err(ConnectorError::invalid_attribute(
                    name,
                    "attribute cannot be set on create",
                ));
            }

            if definition.binding.is_association() {
                memberships = string_values(definition, values)?;
                continue;
            }
            if values.is_empty() {
                continue;
            }
            if definition.required && is_blank(values) {
                return Err(ConnectorError::missing_required(name));
            }

            body.insert(
                definition.native_name.to_string(),
                encode(definition, values)?,
            );
        }

        for definition in self.schema.definitions().iter().filter(|d| d.required) {
            if !body.contains_key(definition.native_name) {
                return Err(ConnectorError::missing_required(definition.name));
            }
        }

        let identity_field = self.schema.class().identity_field();
        let name = body
            .get(identity_field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ConnectorError::missing_required(identity_field))?;

        Ok(CreatePayload {
            body,
            name,
            memberships,
        })
    }

    /// Fold one delta into an update plan.
    pub fn apply_delta(&self, delta: &AttributeDelta, plan: &mut UpdatePlan) -> ConnectorResult<()> {
        let definition = self.definition(delta.name())?;
        if !definition.updatable {
            return Err(ConnectorError::invalid_attribute(
                delta.name(),
                "attribute cannot be updated",
            ));
        }

        if definition.binding.is_association() {
            plan.memberships = Some(match delta.values_to_replace() {
                Some(values) => MembershipChange::Replace(string_values(definition, values)?),
                None => MembershipChange::Partial {
                    add: string_values(definition, delta.values_to_add().unwrap_or_default())?,
                    remove: string_values(
                        definition,
                        delta.values_to_remove().unwrap_or_default(),
                    )?,
                },
            });
            return Ok(());
        }

        let Some(values) = delta.values_to_replace() else {
            return Err(ConnectorError::invalid_attribute(
                delta.name(),
                "only replace is supported for this attribute",
            ));
        };

        let encoded = encode(definition, values)?;
        if definition.binding == Binding::Identity {
            plan.identity = encoded.as_str().map(str::to_string);
        }
        plan.payload
            .insert(definition.native_name.to_string(), encoded);
        Ok(())
    }

    /// Turn a whole delta set into an update plan.
    pub fn plan_update(&self, deltas: &AttributeDeltaSet) -> ConnectorResult<UpdatePlan> {
        if deltas.is_empty() {
            return Err(ConnectorError::invalid_attribute(
                "attributes",
                "no attribute changes supplied",
            ));
        }

        let mut plan = UpdatePlan::default();
        for delta in deltas.iter() {
            self.apply_delta(delta, &mut plan)?;
        }
        Ok(plan)
    }

    /// Build the host object for a fetched resource.
    ///
    /// `memberships` must be supplied when the projection includes an
    /// association attribute; otherwise association attributes are left out.
    pub fn from_remote(
        &self,
        resource: &RemoteResource,
        projection: &Projection<'_>,
        memberships: Option<&[MembershipEdge]>,
    ) -> ConnectorResult<ConnectorObject> {
        let class = self.schema.class();
        let id = resource.id().ok_or_else(|| ConnectorError::Serialization {
            message: format!("{} without an id", class.collection()),
        })?;
        let name = resource
            .str_field(class.identity_field())
            .map(Name::new)
            .ok_or_else(|| ConnectorError::Serialization {
                message: format!("{} {id} without {}", class.collection(), class.identity_field()),
            })?;

        let mut attributes = AttributeSet::new();
        for definition in projection.definitions() {
            if let Some(values) = decode(definition, resource, memberships)? {
                attributes.set(definition.name, values);
            }
        }

        Ok(ConnectorObject {
            object_class: class.host_name().to_string(),
            uid: Uid::with_name_hint(id, name.clone()),
            name,
            attributes,
        })
    }
}

fn is_blank(values: &[AttributeValue]) -> bool {
    values
        .iter()
        .all(|v| v.as_string().is_some_and(|s| s.trim().is_empty()))
}

fn string_values(
    definition: &AttributeDefinition,
    values: &[AttributeValue],
) -> ConnectorResult<Vec<String>> {
    values
        .iter()
        .map(|value| {
            value.as_string().map(str::to_string).ok_or_else(|| {
                ConnectorError::invalid_attribute(
                    definition.name,
                    format!("expected string, got {}", value.type_name()),
                )
            })
        })
        .collect()
}

fn check_type(definition: &AttributeDefinition, value: &AttributeValue) -> ConnectorResult<()> {
    let matches = matches!(
        (definition.value_type, value),
        (AttributeDataType::String, AttributeValue::String(_))
            | (AttributeDataType::Long, AttributeValue::Long(_))
            | (AttributeDataType::Boolean, AttributeValue::Boolean(_))
            | (AttributeDataType::DateTime, AttributeValue::DateTime(_))
    );
    if matches {
        Ok(())
    } else {
        Err(ConnectorError::invalid_attribute(
            definition.name,
            format!(
                "expected {}, got {}",
                definition.value_type,
                value.type_name()
            ),
        ))
    }
}

fn scalar(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::String(s) => Value::String(s.clone()),
        AttributeValue::Long(n) => Value::from(*n),
        AttributeValue::Boolean(b) => Value::Bool(*b),
        AttributeValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
    }
}

/// The value written when an attribute is cleared.
fn cleared(definition: &AttributeDefinition) -> ConnectorResult<Value> {
    match definition.binding {
        Binding::Identity | Binding::Enumerated { .. } => Err(ConnectorError::invalid_attribute(
            definition.name,
            "attribute cannot be cleared",
        )),
        Binding::Status => Ok(Value::String(STATUS_INACTIVE.to_string())),
        _ if definition.multi_valued => Ok(Value::Array(Vec::new())),
        _ => Ok(match definition.value_type {
            AttributeDataType::String => Value::String(String::new()),
            AttributeDataType::Long => Value::from(0),
            AttributeDataType::Boolean => Value::Bool(false),
            AttributeDataType::DateTime => Value::Null,
        }),
    }
}

/// Encode the full value list of one attribute.
fn encode(definition: &AttributeDefinition, values: &[AttributeValue]) -> ConnectorResult<Value> {
    if values.is_empty() {
        return cleared(definition);
    }
    if !definition.multi_valued && values.len() > 1 {
        return Err(ConnectorError::invalid_attribute(
            definition.name,
            format!("expects a single value, got {}", values.len()),
        ));
    }
    for value in values {
        check_type(definition, value)?;
    }

    let first = &values[0];
    match definition.binding {
        Binding::Identity => match first.as_string() {
            Some(s) if !s.trim().is_empty() => Ok(Value::String(s.to_string())),
            _ => Err(ConnectorError::invalid_attribute(
                definition.name,
                "must not be blank",
            )),
        },
        Binding::Status => {
            let active = first.as_boolean().unwrap_or(false);
            Ok(Value::String(
                if active { STATUS_ACTIVE } else { STATUS_INACTIVE }.to_string(),
            ))
        }
        Binding::Enumerated { writable } => match first.as_string() {
            Some(s) if writable.contains(&s) => Ok(Value::String(s.to_string())),
            _ => Err(ConnectorError::invalid_attribute(
                definition.name,
                format!("must be one of {}", writable.join(", ")),
            )),
        },
        Binding::TrackingCodes => values
            .iter()
            .map(|value| encode_tracking_code(definition, value))
            .collect::<ConnectorResult<Vec<_>>>()
            .map(Value::Array),
        _ if definition.multi_valued => Ok(Value::Array(values.iter().map(scalar).collect())),
        _ => Ok(scalar(first)),
    }
}

fn encode_tracking_code(
    definition: &AttributeDefinition,
    value: &AttributeValue,
) -> ConnectorResult<Value> {
    let raw = value.as_string().unwrap_or_default();
    let (name, code) = raw.split_once(':').ok_or_else(|| {
        ConnectorError::invalid_attribute(
            definition.name,
            format!("'{raw}' is not in 'name: value' form"),
        )
    })?;
    Ok(json!({
        "type": "tracking_code",
        "name": name.trim(),
        "value": code.trim(),
    }))
}

fn decode_scalar(
    definition: &AttributeDefinition,
    value: &Value,
) -> ConnectorResult<Option<AttributeValue>> {
    let unexpected = || ConnectorError::Serialization {
        message: format!(
            "unexpected value for {} (expected {}): {value}",
            definition.name, definition.value_type
        ),
    };

    if value.is_null() {
        return Ok(None);
    }
    let decoded = match definition.value_type {
        AttributeDataType::String => {
            AttributeValue::String(value.as_str().ok_or_else(unexpected)?.to_string())
        }
        AttributeDataType::Long => AttributeValue::Long(value.as_i64().ok_or_else(unexpected)?),
        AttributeDataType::Boolean => {
            AttributeValue::Boolean(value.as_bool().ok_or_else(unexpected)?)
        }
        AttributeDataType::DateTime => {
            let raw = value.as_str().ok_or_else(unexpected)?;
            let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| {
                ConnectorError::Serialization {
                    message: format!("invalid timestamp for {}: {e}", definition.name),
                }
            })?;
            AttributeValue::DateTime(parsed.with_timezone(&Utc))
        }
    };
    Ok(Some(decoded))
}

/// Read one attribute from a resource. `None` means the attribute is absent.
fn decode(
    definition: &AttributeDefinition,
    resource: &RemoteResource,
    memberships: Option<&[MembershipEdge]>,
) -> ConnectorResult<Option<Vec<AttributeValue>>> {
    match definition.binding {
        Binding::GroupMemberships => Ok(memberships.map(|edges| {
            edges
                .iter()
                .map(|edge| AttributeValue::String(edge.group_id.clone()))
                .collect()
        })),
        Binding::GroupMembers { role } => Ok(memberships.map(|edges| {
            edges
                .iter()
                .filter(|edge| edge.role == role)
                .map(|edge| AttributeValue::String(edge.user_id.clone()))
                .collect()
        })),
        Binding::Nested { parent, child } => {
            let value = resource.get(parent).and_then(|p| p.get(child));
            match value {
                Some(value) => Ok(decode_scalar(definition, value)?.map(|v| vec![v])),
                None => Ok(None),
            }
        }
        // Other statuses (cannot_delete_edit, cannot_delete_edit_upload) say
        // nothing about whether the account is enabled.
        Binding::Status => Ok(resource
            .str_field(definition.native_name)
            .and_then(|status| match status {
                STATUS_ACTIVE => Some(vec![AttributeValue::Boolean(true)]),
                STATUS_INACTIVE => Some(vec![AttributeValue::Boolean(false)]),
                _ => None,
            })),
        Binding::TrackingCodes => {
            let Some(Value::Array(codes)) = resource.get(definition.native_name) else {
                return Ok(None);
            };
            Ok(Some(
                codes
                    .iter()
                    .map(|code| {
                        let name = code.get("name").and_then(Value::as_str).unwrap_or_default();
                        let value = code.get("value").and_then(Value::as_str).unwrap_or_default();
                        AttributeValue::String(format!("{name}: {value}"))
                    })
                    .collect(),
            ))
        }
        _ => match resource.get(definition.native_name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) if definition.multi_valued => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(value) = decode_scalar(definition, item)? {
                        values.push(value);
                    }
                }
                Ok(Some(values))
            }
            Some(value) => Ok(decode_scalar(definition, value)?.map(|v| vec![v])),
        },
    }
}
