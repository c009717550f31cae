use std::fmt::Debug;

use k8s_openapi::{
    serde::{de::DeserializeOwned, Serialize},
    NamespaceResourceScope,
};
use kube::{
    api::{ListParams, Patch, PatchParams, PostParams},
    Client, Resource,
};
use log::{debug, info};

use crate::helpers::pretty_type_name;

use super::{patch::optimistic_merge_patch, store::StoreError, GetApi};

pub async fn try_get_resource<T>(
    client: &Client,
    name: &str,
    namespace: &str,
) -> Result<Option<T>, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    client.namespaced_api::<T>(namespace).get_opt(name).await
}

pub async fn list_resources<T>(
    client: &Client,
    namespace: &str,
    list_params: &ListParams,
) -> Result<Vec<T>, kube::Error>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    Ok(client
        .namespaced_api::<T>(namespace)
        .list(list_params)
        .await?
        .items)
}

pub async fn create_resource<T>(client: &Client, resource: &T) -> Result<T, StoreError>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Serialize
        + Clone
        + DeserializeOwned
        + Debug,
{
    let namespace = resource
        .meta()
        .namespace
        .as_deref()
        .ok_or(StoreError::MissingObjectMetadata)?;
    let name = resource
        .meta()
        .name
        .as_deref()
        .ok_or(StoreError::MissingObjectMetadata)?;

    info!(
        "Creating '{name}' {} resource in '{namespace}' namespace...",
        pretty_type_name::<T>()
    );

    Ok(client
        .namespaced_api::<T>(namespace)
        .create(&PostParams::default(), resource)
        .await?)
}

/// Writes the difference between `original` and `modified` as a conditional
/// merge patch. Nothing is sent when the two are equal.
pub async fn merge_patch_resource<T>(
    client: &Client,
    original: &T,
    modified: &T,
    patch_params: &PatchParams,
) -> Result<T, StoreError>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Serialize
        + Clone
        + DeserializeOwned
        + Debug,
{
    let namespace = original
        .meta()
        .namespace
        .as_deref()
        .ok_or(StoreError::MissingObjectMetadata)?;
    let name = original
        .meta()
        .name
        .as_deref()
        .ok_or(StoreError::MissingObjectMetadata)?;

    let patch = match optimistic_merge_patch(original, modified)
        .map_err(StoreError::Serialization)?
    {
        Some(patch) => patch,
        None => {
            debug!(
                "'{name}' {} is up to date, skipping the patch",
                pretty_type_name::<T>()
            );
            return Ok(original.to_owned());
        }
    };

    debug!("Patching '{name}' {}: {patch}", pretty_type_name::<T>());

    Ok(client
        .namespaced_api::<T>(namespace)
        .patch(name, patch_params, &Patch::Merge(&patch))
        .await?)
}
