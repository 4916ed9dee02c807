use std::fmt;
use std::str::FromStr;

use objlog_types::{ObjectId, TypeDescriptor, TypeIndex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CodecError, CodecResult};

pub const CMD_TYPE: &str = "ty";
pub const CMD_CREATE: &str = "oc";
pub const CMD_CHANGE_VALUE: &str = "cv";
pub const CMD_SET_FIELDS: &str = "sfs";
pub const CMD_CUSTOM_MODEL: &str = "ctm";

/// Two-part tag `<namespace>:<op>` of a collection-specific journal command.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CustomTag {
    namespace: String,
    op: String,
}

impl CustomTag {
    /// Build a tag; both parts must be non-empty and free of `:`.
    pub fn new(namespace: &str, op: &str) -> CodecResult<Self> {
        if namespace.is_empty() || op.is_empty() || namespace.contains(':') || op.contains(':') {
            return Err(CodecError::UnknownCommand(format!("{namespace}:{op}")));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            op: op.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    /// Returns `true` if this tag is `<namespace>:<op>`.
    pub fn is(&self, namespace: &str, op: &str) -> bool {
        self.namespace == namespace && self.op == op
    }
}

impl FromStr for CustomTag {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, op)) => Self::new(namespace, op),
            None => Err(CodecError::UnknownCommand(s.to_string())),
        }
    }
}

impl fmt::Display for CustomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.op)
    }
}

impl fmt::Debug for CustomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomTag({self})")
    }
}

/// Command kinds, used for routing and for per-kind statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    TypeRegistered,
    ObjectCreated,
    ValueChanged,
    FieldsSet,
    CustomModel,
    CustomOp,
}

impl CommandKind {
    /// Commands that may appear in a snapshot.
    pub fn in_snapshot(self) -> bool {
        matches!(
            self,
            Self::TypeRegistered | Self::ObjectCreated | Self::FieldsSet | Self::CustomModel
        )
    }

    /// Commands that may appear in a journal.
    pub fn in_journal(self) -> bool {
        matches!(
            self,
            Self::TypeRegistered | Self::ObjectCreated | Self::ValueChanged | Self::CustomOp
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::TypeRegistered => CMD_TYPE,
            Self::ObjectCreated => CMD_CREATE,
            Self::ValueChanged => CMD_CHANGE_VALUE,
            Self::FieldsSet => CMD_SET_FIELDS,
            Self::CustomModel => CMD_CUSTOM_MODEL,
            Self::CustomOp => "custom",
        }
    }
}

/// One durable fact of a snapshot or journal.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    /// `{"c":"ty","n":<descriptor>,"i":<index>}`
    TypeRegistered {
        descriptor: TypeDescriptor,
        index: TypeIndex,
    },
    /// `{"c":"oc","ti":<index>,"oi":<id>}`
    ObjectCreated {
        type_index: TypeIndex,
        object_id: ObjectId,
    },
    /// `{"c":"cv","ti":..,"oi":..,"n":<field>,"v":<scalar or id>}`
    ValueChanged {
        type_index: TypeIndex,
        object_id: ObjectId,
        field: String,
        value: Value,
    },
    /// `{"c":"sfs","ti":..,"oi":..,"m":{<field>:<value>,..}}`
    FieldsSet {
        type_index: TypeIndex,
        object_id: ObjectId,
        fields: Map<String, Value>,
    },
    /// `{"c":"ctm","ti":..,"oi":..,"m":<document>}`
    CustomModel {
        type_index: TypeIndex,
        object_id: ObjectId,
        model: Value,
    },
    /// `{"c":"<ns>:<op>","ti":..,"oi":..,"m":<document>}`
    CustomOp {
        tag: CustomTag,
        type_index: TypeIndex,
        object_id: ObjectId,
        model: Value,
    },
}

impl Record {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::TypeRegistered { .. } => CommandKind::TypeRegistered,
            Self::ObjectCreated { .. } => CommandKind::ObjectCreated,
            Self::ValueChanged { .. } => CommandKind::ValueChanged,
            Self::FieldsSet { .. } => CommandKind::FieldsSet,
            Self::CustomModel { .. } => CommandKind::CustomModel,
            Self::CustomOp { .. } => CommandKind::CustomOp,
        }
    }

    /// The `c` tag this record is written with.
    pub fn command(&self) -> String {
        match self {
            Self::CustomOp { tag, .. } => tag.to_string(),
            other => other.kind().label().to_string(),
        }
    }

    /// Target `(type, object)` of every record except type registration.
    pub fn target(&self) -> Option<(TypeIndex, ObjectId)> {
        match self {
            Self::TypeRegistered { .. } => None,
            Self::ObjectCreated {
                type_index,
                object_id,
            }
            | Self::ValueChanged {
                type_index,
                object_id,
                ..
            }
            | Self::FieldsSet {
                type_index,
                object_id,
                ..
            }
            | Self::CustomModel {
                type_index,
                object_id,
                ..
            }
            | Self::CustomOp {
                type_index,
                object_id,
                ..
            } => Some((*type_index, *object_id)),
        }
    }

    /// Encode as a single JSON line without the trailing newline.
    pub fn to_line(&self) -> CodecResult<String> {
        Ok(serde_json::to_string(&WireRecord::from(self))?)
    }

    /// Decode one JSON line.
    pub fn from_line(line: &str) -> CodecResult<Self> {
        let wire: WireRecord = serde_json::from_str(line)?;
        Self::try_from(wire)
    }
}

/// Flat on-disk shape shared by every command.
#[derive(Serialize, Deserialize)]
struct WireRecord {
    c: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ti: Option<TypeIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    oi: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    i: Option<TypeIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    m: Option<Value>,
}

impl WireRecord {
    fn bare(c: String) -> Self {
        Self {
            c,
            ti: None,
            oi: None,
            n: None,
            i: None,
            v: None,
            m: None,
        }
    }

    fn targeted(c: String, ti: TypeIndex, oi: ObjectId) -> Self {
        Self {
            ti: Some(ti),
            oi: Some(oi),
            ..Self::bare(c)
        }
    }

    fn require<T>(&self, value: Option<T>, field: &'static str) -> CodecResult<T> {
        value.ok_or_else(|| CodecError::MissingField {
            command: self.c.clone(),
            field,
        })
    }

    fn target(&self) -> CodecResult<(TypeIndex, ObjectId)> {
        let ti = self.require(self.ti, "ti")?;
        let oi = self.require(self.oi, "oi")?;
        if oi.is_null() {
            return Err(CodecError::InvalidField {
                command: self.c.clone(),
                field: "oi",
                reason: "object id 0 is reserved".into(),
            });
        }
        Ok((ti, oi))
    }
}

impl From<&Record> for WireRecord {
    fn from(record: &Record) -> Self {
        match record {
            Record::TypeRegistered { descriptor, index } => Self {
                n: Some(descriptor.to_string()),
                i: Some(*index),
                ..Self::bare(CMD_TYPE.into())
            },
            Record::ObjectCreated {
                type_index,
                object_id,
            } => Self::targeted(CMD_CREATE.into(), *type_index, *object_id),
            Record::ValueChanged {
                type_index,
                object_id,
                field,
                value,
            } => Self {
                n: Some(field.clone()),
                v: Some(value.clone()),
                ..Self::targeted(CMD_CHANGE_VALUE.into(), *type_index, *object_id)
            },
            Record::FieldsSet {
                type_index,
                object_id,
                fields,
            } => Self {
                m: Some(Value::Object(fields.clone())),
                ..Self::targeted(CMD_SET_FIELDS.into(), *type_index, *object_id)
            },
            Record::CustomModel {
                type_index,
                object_id,
                model,
            } => Self {
                m: Some(model.clone()),
                ..Self::targeted(CMD_CUSTOM_MODEL.into(), *type_index, *object_id)
            },
            Record::CustomOp {
                tag,
                type_index,
                object_id,
                model,
            } => Self {
                m: Some(model.clone()),
                ..Self::targeted(tag.to_string(), *type_index, *object_id)
            },
        }
    }
}

impl TryFrom<WireRecord> for Record {
    type Error = CodecError;

    fn try_from(mut wire: WireRecord) -> Result<Self, Self::Error> {
        let record = match wire.c.as_str() {
            CMD_TYPE => {
                let name = wire.n.take();
                let name = wire.require(name, "n")?;
                let index = wire.require(wire.i, "i")?;
                let descriptor =
                    TypeDescriptor::parse(&name).map_err(|e| CodecError::InvalidField {
                        command: wire.c.clone(),
                        field: "n",
                        reason: e.to_string(),
                    })?;
                Record::TypeRegistered { descriptor, index }
            }
            CMD_CREATE => {
                let (type_index, object_id) = wire.target()?;
                Record::ObjectCreated {
                    type_index,
                    object_id,
                }
            }
            CMD_CHANGE_VALUE => {
                let (type_index, object_id) = wire.target()?;
                let field = wire.n.take();
                let field = wire.require(field, "n")?;
                // A JSON null and an absent "v" both decode to Null.
                let value = wire.v.take().unwrap_or(Value::Null);
                Record::ValueChanged {
                    type_index,
                    object_id,
                    field,
                    value,
                }
            }
            CMD_SET_FIELDS => {
                let (type_index, object_id) = wire.target()?;
                let model = wire.m.take();
                let fields = match wire.require(model, "m")? {
                    Value::Object(fields) => fields,
                    other => {
                        return Err(CodecError::InvalidField {
                            command: wire.c.clone(),
                            field: "m",
                            reason: format!("expected an object, found {other}"),
                        })
                    }
                };
                Record::FieldsSet {
                    type_index,
                    object_id,
                    fields,
                }
            }
            CMD_CUSTOM_MODEL => {
                let (type_index, object_id) = wire.target()?;
                Record::CustomModel {
                    type_index,
                    object_id,
                    model: wire.m.take().unwrap_or(Value::Null),
                }
            }
            other => {
                let tag: CustomTag = other.parse()?;
                let (type_index, object_id) = wire.target()?;
                Record::CustomOp {
                    tag,
                    type_index,
                    object_id,
                    model: wire.m.take().unwrap_or(Value::Null),
                }
            }
        };
        Ok(record)
    }
}
