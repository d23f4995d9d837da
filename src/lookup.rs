//! Lookup-by-handle (§4.6): resolve a previously created container by
//! its runtime handle, scoped to a team.

use std::sync::Arc;

use crate::error::ProviderResult;
use crate::handle::Container;
use crate::interfaces::{DbTeamFactory, DbVolumeRepository, RuntimeClient, VolumeClient};
use crate::spec::{ContainerMetadata, TeamId};

/// `FindCreatedContainerByHandle`. Per §4.6:
/// - runtime not-found -> `Ok(None)`,
/// - any other runtime error -> propagated,
/// - found -> resolve the DB row and volume list and assemble a handle.
pub async fn find_created_container_by_handle(
    runtime: &dyn RuntimeClient,
    volume_client: Arc<dyn VolumeClient>,
    db_team_factory: &dyn DbTeamFactory,
    db_volume_repository: &dyn DbVolumeRepository,
    team_id: TeamId,
    handle: &str,
    default_user: &str,
) -> ProviderResult<Option<Container>> {
    let runtime_container = match runtime.lookup(handle).await? {
        Some(container) => container,
        None => return Ok(None),
    };

    // `team_id` scopes this lookup to the caller's team; resolving it
    // surfaces an unknown-team error the same way an unknown handle
    // would, before we bother querying the volume repository.
    let team = db_team_factory.team(team_id).await?;
    let created = team.find_created_container_by_handle(handle).await?;
    let metadata = created.map(|c| c.metadata()).unwrap_or_default();

    let records = db_volume_repository.volumes_for_container(handle).await?;

    Ok(Some(Container::new(
        runtime_container,
        volume_client,
        records,
        metadata,
        default_user.to_string(),
    )))
}
