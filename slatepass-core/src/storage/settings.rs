//! User preferences, packed under a fixed schema

use super::Result;
use crate::codec::{pack, unpack, CodecError, FieldType, Value};
use serde::{Deserialize, Serialize};

const SETTINGS_SCHEMA: [FieldType; 10] = [
    FieldType::Bool,
    FieldType::Bool,
    FieldType::Bool,
    FieldType::Bool,
    FieldType::Bool,
    FieldType::Bool,
    FieldType::Bool,
    FieldType::Bool,
    FieldType::Int32,
    FieldType::Int32,
];

/// Preferences stored in the `s` slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Keep random passwords in history items
    pub remember_random_into_history: bool,
    /// Keep derived passwords in history items
    pub remember_fixed_into_history: bool,
    pub remember_parameters_into_history: bool,
    /// Persist the last used parameters instead of resetting them
    pub remember_last_parameters: bool,
    pub remember_master_password: bool,
    /// Apply a history match when the salt changes
    pub auto_search_history: bool,
    pub hide_generated_password: bool,
    pub cloud_sync: bool,
    /// Seconds before the master secret in the UI state is forgotten; the
    /// service uses it when a secret is set without an explicit TTL
    pub forget_secret_after_secs: i32,
    pub max_history: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remember_random_into_history: true,
            remember_fixed_into_history: false,
            remember_parameters_into_history: true,
            remember_last_parameters: false,
            remember_master_password: false,
            auto_search_history: true,
            hide_generated_password: false,
            cloud_sync: true,
            forget_secret_after_secs: 20,
            max_history: 100,
        }
    }
}

impl Settings {
    pub fn pack(&self) -> Result<String> {
        let values = [
            Value::Bool(self.remember_random_into_history),
            Value::Bool(self.remember_fixed_into_history),
            Value::Bool(self.remember_parameters_into_history),
            Value::Bool(self.remember_last_parameters),
            Value::Bool(self.remember_master_password),
            Value::Bool(self.auto_search_history),
            Value::Bool(self.hide_generated_password),
            Value::Bool(self.cloud_sync),
            Value::Int32(self.forget_secret_after_secs),
            Value::Int32(self.max_history),
        ];
        Ok(pack(&SETTINGS_SCHEMA, &values)?)
    }

    pub fn unpack(packed: &str) -> Result<Self> {
        let values = unpack(&SETTINGS_SCHEMA, packed)?;
        let flag = |i: usize| values.get(i).and_then(Value::as_bool).unwrap_or_default();
        let number = |i: usize| -> Result<i32> {
            match values.get(i) {
                Some(Value::Int32(v)) => Ok(*v),
                _ => Err(CodecError::UnexpectedShape(format!("settings field {} is not an int", i)).into()),
            }
        };

        Ok(Self {
            remember_random_into_history: flag(0),
            remember_fixed_into_history: flag(1),
            remember_parameters_into_history: flag(2),
            remember_last_parameters: flag(3),
            remember_master_password: flag(4),
            auto_search_history: flag(5),
            hide_generated_password: flag(6),
            cloud_sync: flag(7),
            forget_secret_after_secs: number(8)?,
            max_history: number(9)?,
        })
    }

    /// History cap; negative values mean no history
    pub fn history_cap(&self) -> usize {
        usize::try_from(self.max_history).unwrap_or(0)
    }

    pub fn get(&self, key: SettingKey) -> SettingField {
        match key {
            SettingKey::RememberRandomIntoHistory => {
                SettingField::RememberRandomIntoHistory(self.remember_random_into_history)
            }
            SettingKey::RememberFixedIntoHistory => {
                SettingField::RememberFixedIntoHistory(self.remember_fixed_into_history)
            }
            SettingKey::RememberParametersIntoHistory => {
                SettingField::RememberParametersIntoHistory(self.remember_parameters_into_history)
            }
            SettingKey::RememberLastParameters => {
                SettingField::RememberLastParameters(self.remember_last_parameters)
            }
            SettingKey::RememberMasterPassword => {
                SettingField::RememberMasterPassword(self.remember_master_password)
            }
            SettingKey::AutoSearchHistory => SettingField::AutoSearchHistory(self.auto_search_history),
            SettingKey::HideGeneratedPassword => {
                SettingField::HideGeneratedPassword(self.hide_generated_password)
            }
            SettingKey::CloudSync => SettingField::CloudSync(self.cloud_sync),
            SettingKey::ForgetSecretAfterSecs => {
                SettingField::ForgetSecretAfterSecs(self.forget_secret_after_secs)
            }
            SettingKey::MaxHistory => SettingField::MaxHistory(self.max_history),
        }
    }

    pub fn set(&mut self, field: SettingField) {
        match field {
            SettingField::RememberRandomIntoHistory(v) => self.remember_random_into_history = v,
            SettingField::RememberFixedIntoHistory(v) => self.remember_fixed_into_history = v,
            SettingField::RememberParametersIntoHistory(v) => {
                self.remember_parameters_into_history = v
            }
            SettingField::RememberLastParameters(v) => self.remember_last_parameters = v,
            SettingField::RememberMasterPassword(v) => self.remember_master_password = v,
            SettingField::AutoSearchHistory(v) => self.auto_search_history = v,
            SettingField::HideGeneratedPassword(v) => self.hide_generated_password = v,
            SettingField::CloudSync(v) => self.cloud_sync = v,
            SettingField::ForgetSecretAfterSecs(v) => self.forget_secret_after_secs = v,
            SettingField::MaxHistory(v) => self.max_history = v,
        }
    }
}

/// Name of a setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    RememberRandomIntoHistory,
    RememberFixedIntoHistory,
    RememberParametersIntoHistory,
    RememberLastParameters,
    RememberMasterPassword,
    AutoSearchHistory,
    HideGeneratedPassword,
    CloudSync,
    ForgetSecretAfterSecs,
    MaxHistory,
}

/// A single setting update. The value type is checked when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "snake_case")]
pub enum SettingField {
    RememberRandomIntoHistory(bool),
    RememberFixedIntoHistory(bool),
    RememberParametersIntoHistory(bool),
    RememberLastParameters(bool),
    RememberMasterPassword(bool),
    AutoSearchHistory(bool),
    HideGeneratedPassword(bool),
    CloudSync(bool),
    ForgetSecretAfterSecs(i32),
    MaxHistory(i32),
}
