//! Schema registry for the Box object classes.
//!
//! Each object class is described by an ordered list of
//! [`AttributeDefinition`]s. A definition carries a closed [`Binding`] that
//! tells the mapper how the attribute travels to and from the remote JSON,
//! so the mapper dispatches on data rather than on attribute names.
//!
//! Definitions are built lazily, once per [`SchemaRegistry`] instance.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use tracing::debug;
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::operation::{OperationOptions, ENABLE, NAME};
use xavyo_connector::schema::{
    AttributeDataType, AttributeInfo, ObjectClassInfo, Schema, ACCOUNT_OBJECT_CLASS,
    GROUP_OBJECT_CLASS,
};

use crate::classify::ResourceKind;
use crate::membership::MembershipRole;

/// Writable values of the user `role` attribute. Reads may return others
/// (`admin`, for instance).
pub const WRITABLE_USER_ROLES: &[&str] = &["coadmin", "user"];

/// Object classes exposed by the Box connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxObjectClass {
    User,
    Group,
}

impl BoxObjectClass {
    /// Resolve an object class name supplied by the host.
    pub fn from_host(object_class: &str) -> ConnectorResult<Self> {
        match object_class {
            "user" | ACCOUNT_OBJECT_CLASS => Ok(BoxObjectClass::User),
            "group" | GROUP_OBJECT_CLASS => Ok(BoxObjectClass::Group),
            other => Err(ConnectorError::UnsupportedObjectClass {
                object_class: other.to_string(),
            }),
        }
    }

    /// Object class name reported back to the host.
    pub fn host_name(&self) -> &'static str {
        match self {
            BoxObjectClass::User => ACCOUNT_OBJECT_CLASS,
            BoxObjectClass::Group => GROUP_OBJECT_CLASS,
        }
    }

    /// API collection path segment.
    pub fn collection(&self) -> &'static str {
        match self {
            BoxObjectClass::User => "users",
            BoxObjectClass::Group => "groups",
        }
    }

    /// Remote field backing `__NAME__`.
    pub fn identity_field(&self) -> &'static str {
        match self {
            BoxObjectClass::User => "login",
            BoxObjectClass::Group => "name",
        }
    }

    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            BoxObjectClass::User => ResourceKind::User,
            BoxObjectClass::Group => ResourceKind::Group,
        }
    }
}

/// When an attribute is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Always returned.
    Minimal,
    /// Returned unless the caller opts out of default attributes.
    Standard,
    /// Returned only when requested by name.
    Full,
}

/// What a by-UID search does when the object does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundPolicy {
    /// Complete the search with no results.
    EmptyResult,
    /// Fail with `UnknownUid`.
    UnknownIdentity,
}

/// How an attribute is carried in the remote representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Top-level scalar or array field named by `native_name`.
    Field,
    /// The field backing `__NAME__`.
    Identity,
    /// Read-only field one object down, e.g. `enterprise.id`.
    Nested {
        parent: &'static str,
        child: &'static str,
    },
    /// `__ENABLE__` as `status` (`active` / `inactive`).
    Status,
    /// String field whose writable values are restricted.
    Enumerated { writable: &'static [&'static str] },
    /// `[{"type":"tracking_code","name":..,"value":..}]` as `"name: value"`.
    TrackingCodes,
    /// Ids of the groups a user belongs to.
    GroupMemberships,
    /// Ids of the users holding `role` in a group.
    GroupMembers { role: MembershipRole },
}

impl Binding {
    /// Whether reading or writing the attribute takes calls beyond the
    /// resource's own endpoint.
    pub fn is_association(&self) -> bool {
        matches!(
            self,
            Binding::GroupMemberships | Binding::GroupMembers { .. }
        )
    }
}

/// One attribute of an object class.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDefinition {
    pub name: &'static str,
    pub native_name: &'static str,
    pub value_type: AttributeDataType,
    pub multi_valued: bool,
    pub required: bool,
    pub creatable: bool,
    pub updatable: bool,
    pub readable: bool,
    pub case_insensitive: bool,
    pub tier: Tier,
    pub binding: Binding,
}

impl AttributeDefinition {
    fn new(name: &'static str, value_type: AttributeDataType, tier: Tier) -> Self {
        Self {
            name,
            native_name: name,
            value_type,
            multi_valued: false,
            required: false,
            creatable: true,
            updatable: true,
            readable: true,
            case_insensitive: false,
            tier,
            binding: Binding::Field,
        }
    }

    fn string(name: &'static str, tier: Tier) -> Self {
        Self::new(name, AttributeDataType::String, tier)
    }

    fn long(name: &'static str, tier: Tier) -> Self {
        Self::new(name, AttributeDataType::Long, tier)
    }

    fn boolean(name: &'static str, tier: Tier) -> Self {
        Self::new(name, AttributeDataType::Boolean, tier)
    }

    fn date_time(name: &'static str, tier: Tier) -> Self {
        Self::new(name, AttributeDataType::DateTime, tier)
    }

    #[must_use]
    fn native(mut self, native_name: &'static str) -> Self {
        self.native_name = native_name;
        self
    }

    #[must_use]
    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    #[must_use]
    fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    #[must_use]
    fn read_only(mut self) -> Self {
        self.creatable = false;
        self.updatable = false;
        self
    }

    #[must_use]
    fn create_only(mut self) -> Self {
        self.updatable = false;
        self
    }

    #[must_use]
    fn update_only(mut self) -> Self {
        self.creatable = false;
        self.readable = false;
        self
    }

    #[must_use]
    fn bound(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }

    /// Whether the attribute is returned when the caller does not ask for it.
    pub fn returned_by_default(&self) -> bool {
        self.readable && self.tier <= Tier::Standard
    }

    /// The remote field that must be requested to read this attribute.
    pub fn fetch_field(&self) -> Option<&'static str> {
        if !self.readable {
            return None;
        }
        match self.binding {
            Binding::Nested { parent, .. } => Some(parent),
            Binding::GroupMemberships | Binding::GroupMembers { .. } => None,
            _ => Some(self.native_name),
        }
    }

    /// Host-facing description.
    pub fn to_info(&self) -> AttributeInfo {
        AttributeInfo {
            name: self.name.to_string(),
            native_name: self.native_name.to_string(),
            data_type: self.value_type,
            multi_valued: self.multi_valued,
            required: self.required,
            creatable: self.creatable,
            updatable: self.updatable,
            readable: self.readable,
            returned_by_default: self.returned_by_default(),
            case_insensitive: self.case_insensitive,
        }
    }
}

fn user_definitions() -> Vec<AttributeDefinition> {
    use AttributeDefinition as A;
    use Tier::{Full, Minimal, Standard};

    vec![
        A::string(NAME, Minimal)
            .native("login")
            .required()
            .case_insensitive()
            .bound(Binding::Identity),
        A::string("name", Minimal).required(),
        A::boolean(ENABLE, Standard)
            .native("status")
            .bound(Binding::Status),
        A::date_time("created_at", Standard).read_only(),
        A::date_time("modified_at", Standard).read_only(),
        A::string("language", Standard),
        A::string("timezone", Standard),
        A::string("job_title", Standard),
        A::string("phone", Standard),
        A::string("address", Standard),
        A::long("space_amount", Standard),
        A::long("space_used", Standard).read_only(),
        A::long("max_upload_size", Standard).read_only(),
        A::string("avatar_url", Standard).read_only(),
        A::string("role", Full).bound(Binding::Enumerated {
            writable: WRITABLE_USER_ROLES,
        }),
        A::string("external_app_user_id", Full).create_only(),
        A::boolean("is_sync_enabled", Full),
        A::boolean("can_see_managed_users", Full),
        A::boolean("is_exempt_from_device_limits", Full),
        A::boolean("is_exempt_from_login_verification", Full),
        A::boolean("is_external_collab_restricted", Full),
        A::boolean("is_platform_access_only", Full).read_only(),
        A::string("hostname", Full).read_only(),
        A::string("my_tags", Full).multi_valued().read_only(),
        A::string("tracking_codes", Full)
            .multi_valued()
            .bound(Binding::TrackingCodes),
        A::string("enterprise.id", Full)
            .read_only()
            .bound(Binding::Nested {
                parent: "enterprise",
                child: "id",
            }),
        A::string("enterprise.name", Full)
            .read_only()
            .bound(Binding::Nested {
                parent: "enterprise",
                child: "name",
            }),
        A::boolean("notify", Full).update_only(),
        A::boolean("is_password_reset_required", Full).update_only(),
        A::string("group_membership", Full)
            .multi_valued()
            .bound(Binding::GroupMemberships),
    ]
}

fn group_definitions() -> Vec<AttributeDefinition> {
    use AttributeDefinition as A;
    use Tier::{Full, Minimal, Standard};

    vec![
        A::string(NAME, Minimal)
            .native("name")
            .required()
            .case_insensitive()
            .bound(Binding::Identity),
        A::string("group_type", Minimal).read_only(),
        A::date_time("created_at", Standard).read_only(),
        A::date_time("modified_at", Standard).read_only(),
        A::string("description", Full),
        A::string("provenance", Full),
        A::string("external_sync_identifier", Full),
        A::string("invitability_level", Full),
        A::string("member_viewability_level", Full),
        A::string("member", Full)
            .multi_valued()
            .read_only()
            .bound(Binding::GroupMembers {
                role: MembershipRole::Member,
            }),
        A::string("admin", Full)
            .multi_valued()
            .read_only()
            .bound(Binding::GroupMembers {
                role: MembershipRole::Admin,
            }),
    ]
}

/// The attribute catalogue of one object class.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectClassSchema {
    class: BoxObjectClass,
    not_found: NotFoundPolicy,
    definitions: Vec<AttributeDefinition>,
    index: HashMap<&'static str, usize>,
}

impl ObjectClassSchema {
    fn build(class: BoxObjectClass) -> Self {
        let (definitions, not_found) = match class {
            BoxObjectClass::User => (user_definitions(), NotFoundPolicy::UnknownIdentity),
            BoxObjectClass::Group => (group_definitions(), NotFoundPolicy::EmptyResult),
        };
        let index = definitions
            .iter()
            .enumerate()
            .map(|(position, definition)| (definition.name, position))
            .collect();

        debug!(
            object_class = class.host_name(),
            attributes = definitions.len(),
            "Built object class schema"
        );

        Self {
            class,
            not_found,
            definitions,
            index,
        }
    }

    pub fn class(&self) -> BoxObjectClass {
        self.class
    }

    pub fn not_found_policy(&self) -> NotFoundPolicy {
        self.not_found
    }

    /// Definitions in declaration order.
    pub fn definitions(&self) -> &[AttributeDefinition] {
        &self.definitions
    }

    pub fn definition(&self, name: &str) -> Option<&AttributeDefinition> {
        self.index.get(name).map(|&position| &self.definitions[position])
    }

    pub fn to_info(&self) -> ObjectClassInfo {
        self.definitions
            .iter()
            .fold(ObjectClassInfo::new(self.class.host_name()), |info, definition| {
                info.with_attribute(definition.to_info())
            })
    }
}

/// Lazily built schemas, owned by one connector instance.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    user: OnceLock<ObjectClassSchema>,
    group: OnceLock<ObjectClassSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema_for(&self, class: BoxObjectClass) -> &ObjectClassSchema {
        match class {
            BoxObjectClass::User => self.user.get_or_init(|| ObjectClassSchema::build(class)),
            BoxObjectClass::Group => self.group.get_or_init(|| ObjectClassSchema::build(class)),
        }
    }

    /// The schema advertised to the host.
    pub fn schema(&self) -> Schema {
        Schema::new()
            .with_object_class(self.schema_for(BoxObjectClass::User).to_info())
            .with_object_class(self.schema_for(BoxObjectClass::Group).to_info())
    }
}

/// The attributes one read or search returns.
///
/// Minimal attributes are always present; standard ones unless the caller
/// opts out of default attributes; anything readable the caller names is
/// added on top.
#[derive(Debug, Clone)]
pub struct Projection<'s> {
    schema: &'s ObjectClassSchema,
    selected: HashSet<&'static str>,
}

impl<'s> Projection<'s> {
    pub fn from_options(schema: &'s ObjectClassSchema, options: &OperationOptions) -> Self {
        let mut selected: HashSet<&'static str> = schema
            .definitions()
            .iter()
            .filter(|d| {
                d.readable
                    && (d.tier == Tier::Minimal
                        || (options.return_default_attributes && d.tier == Tier::Standard))
            })
            .map(|d| d.name)
            .collect();

        for requested in options.attributes_to_get.iter().flatten() {
            match schema.definition(requested) {
                Some(definition) if definition.readable => {
                    selected.insert(definition.name);
                }
                Some(_) => debug!(attribute = %requested, "Ignoring request for write-only attribute"),
                None => debug!(attribute = %requested, "Ignoring request for unknown attribute"),
            }
        }

        Self { schema, selected }
    }

    pub fn includes(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    /// Selected definitions in declaration order.
    pub fn definitions(&self) -> impl Iterator<Item = &'s AttributeDefinition> + '_ {
        self.schema
            .definitions()
            .iter()
            .filter(|d| self.selected.contains(d.name))
    }

    /// Whether any selected attribute needs a membership lookup.
    pub fn needs_memberships(&self) -> bool {
        self.definitions().any(|d| d.binding.is_association())
    }

    /// Value of the `fields` query parameter: the selected native fields, in
    /// declaration order, without duplicates.
    pub fn fields_param(&self) -> String {
        let mut seen = HashSet::new();
        self.definitions()
            .filter_map(AttributeDefinition::fetch_field)
            .filter(|field| seen.insert(*field))
            .collect::<Vec<_>>()
            .join(",")
    }
}
