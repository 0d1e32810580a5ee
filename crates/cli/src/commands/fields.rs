use clap::ValueEnum;
use kommo_sync_kommo::Entity;

use crate::commands::{kommo_failure, with_runtime, CommandResult, Failure};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FieldEntity {
    Contacts,
    Leads,
}

impl From<FieldEntity> for Entity {
    fn from(value: FieldEntity) -> Self {
        match value {
            FieldEntity::Contacts => Entity::Contacts,
            FieldEntity::Leads => Entity::Leads,
        }
    }
}

/// Lists CRM custom field definitions so operators can verify mapped field ids.
pub fn run(entity: FieldEntity) -> CommandResult {
    let entity = Entity::from(entity);
    with_runtime("fields", |runtime| async move {
        let fields =
            runtime.client.custom_fields(entity).await.map_err(|error| kommo_failure(&error))?;
        let message = format!("{} {} custom fields", fields.len(), entity.as_str());
        Ok::<_, Failure>(CommandResult::success_with("fields", message, fields))
    })
}
