use bevy::prelude::*;
use tracing::warn;

use crate::{grid::ScalarGrid, mesh::IsoMesh, types::Value, worker::SurfaceWorker};

/// System sets for the isosurface pipeline.
///
/// Use these to order your own systems relative to extraction:
///
/// ```rust,ignore
/// // Inspect or post-process geometry after it arrives but before it replaces the old mesh:
/// app.add_systems(Update, count_triangles.after(IsosurfaceSet::Generate)
///                                        .before(IsosurfaceSet::Upload));
/// ```
///
/// ```text
/// IsosurfaceSet::Spawn   →  [async compute]  →  IsosurfaceSet::Generate  →  [your systems]  →  IsosurfaceSet::Upload
/// ```
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum IsosurfaceSet {
    /// Submits an extraction request for each queued surface.
    Spawn,
    /// Polls workers and inserts [`GeneratedSurface`] when the current generation completes.
    Generate,
    /// Swaps [`GeneratedSurface`] data into the entity's [`Mesh3d`], releasing the previous mesh.
    Upload,
}

/// Sign of an orbital region. Each lobe is extracted and rendered as its own surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lobe {
    Positive,
    Negative,
}

impl Lobe {
    /// Threshold that bounds this lobe for a user-facing (unsigned) `isovalue`.
    pub fn threshold(self, isovalue: Value) -> Value {
        match self {
            Lobe::Positive => isovalue.abs(),
            Lobe::Negative => -isovalue.abs(),
        }
    }
}

/// A surface to extract from a sampled orbital.
///
/// Any change to this component (including inserting it) queues a new extraction.
/// The grid is shared by reference count, so both lobes of an orbital can point at the
/// same samples.
#[derive(Component, Clone, Debug)]
#[require(Transform)]
pub struct OrbitalSurface {
    pub grid: ScalarGrid,
    /// Unsigned isovalue; the sign comes from [`lobe`](OrbitalSurface::lobe).
    pub isovalue: Value,
    pub lobe: Lobe,
}

impl OrbitalSurface {
    pub fn new(grid: ScalarGrid, isovalue: Value, lobe: Lobe) -> Self {
        Self {
            grid,
            isovalue,
            lobe,
        }
    }

    /// The positive and negative lobe surfaces of one orbital.
    pub fn lobes(grid: ScalarGrid, isovalue: Value) -> [Self; 2] {
        [
            Self::new(grid.clone(), isovalue, Lobe::Positive),
            Self::new(grid, isovalue, Lobe::Negative),
        ]
    }

    /// The threshold actually passed to the extractor.
    pub fn threshold(&self) -> Value {
        self.lobe.threshold(self.isovalue)
    }
}

/// Marker component added to [`OrbitalSurface`] entities that need a new extraction.
///
/// Removed as soon as the request has been submitted.
#[derive(Component)]
pub struct QueuedSurface;

/// The extraction worker owned by one [`OrbitalSurface`] entity.
///
/// Inserted on the first submission and kept for the entity's lifetime so later
/// requests can supersede earlier ones.
#[derive(Component, Default)]
pub struct SurfaceTask(pub SurfaceWorker);

/// Freshly extracted geometry, waiting for [`IsosurfaceSet::Upload`].
#[derive(Component, Debug)]
pub struct GeneratedSurface {
    pub generation: u64,
    pub mesh: IsoMesh,
}

/// Runtime configuration for the isosurface pipeline.
///
/// Inserted as a resource by [`IsosurfacePlugin`]. Modify it at any time to change behaviour:
///
/// ```rust,ignore
/// app.add_plugins(IsosurfacePlugin { max_tasks_per_frame: 8, ..default() });
///
/// // Or change it at runtime:
/// fn my_system(mut config: ResMut<IsosurfaceConfig>) {
///     config.max_tasks_per_frame = 1;
/// }
/// ```
#[derive(Resource)]
pub struct IsosurfaceConfig {
    /// Maximum number of extraction requests submitted per frame.
    ///
    /// Surfaces over the limit stay queued for the next frame. Default: `4`.
    pub max_tasks_per_frame: usize,
}

impl Default for IsosurfaceConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_frame: 4,
        }
    }
}

/// Bevy plugin that keeps orbital isosurface meshes in sync with their [`OrbitalSurface`].
///
/// When the `auto_queue` feature is enabled, every added or changed [`OrbitalSurface`] is
/// re-extracted on Bevy's `AsyncComputeTaskPool`, so the main thread is never blocked:
///
/// ```text
/// OrbitalSurface added / changed
///   → QueuedSurface inserted          (on_surface_change)
///   → request submitted, new gen      (IsosurfaceSet::Spawn)
///   → [async compute runs]
///   → GeneratedSurface inserted       (IsosurfaceSet::Generate, current generation only)
///   → [your systems here]
///   → Mesh3d swapped, old mesh freed  (IsosurfaceSet::Upload)
/// ```
pub struct IsosurfacePlugin {
    /// Initial value for [`IsosurfaceConfig::max_tasks_per_frame`].
    pub max_tasks_per_frame: usize,
}

impl Default for IsosurfacePlugin {
    fn default() -> Self {
        Self {
            max_tasks_per_frame: IsosurfaceConfig::default().max_tasks_per_frame,
        }
    }
}

impl Plugin for IsosurfacePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(IsosurfaceConfig {
            max_tasks_per_frame: self.max_tasks_per_frame,
        });

        #[cfg(feature = "auto_queue")]
        app.configure_sets(
            Update,
            (
                IsosurfaceSet::Spawn,
                IsosurfaceSet::Generate,
                IsosurfaceSet::Upload,
            )
                .chain(),
        )
        .add_systems(
            Update,
            (
                on_surface_change.before(IsosurfaceSet::Spawn),
                spawn_surface_tasks.in_set(IsosurfaceSet::Spawn),
                poll_surface_tasks.in_set(IsosurfaceSet::Generate),
                upload_surface.in_set(IsosurfaceSet::Upload),
            ),
        );
    }
}

/// Inserts [`QueuedSurface`] on every added or modified [`OrbitalSurface`].
fn on_surface_change(
    mut commands: Commands,
    query: Query<Entity, (Changed<OrbitalSurface>, Without<QueuedSurface>)>,
) {
    for entity in query.iter() {
        commands.entity(entity).insert(QueuedSurface);
    }
}

/// Submits requests for [`QueuedSurface`]s, up to [`IsosurfaceConfig::max_tasks_per_frame`] per frame.
fn spawn_surface_tasks(
    mut commands: Commands,
    config: Res<IsosurfaceConfig>,
    mut query: Query<(Entity, &OrbitalSurface, Option<&mut SurfaceTask>), With<QueuedSurface>>,
) {
    for (entity, surface, task) in query.iter_mut().take(config.max_tasks_per_frame) {
        // Cloning the grid is a single Arc bump, no sample data is copied on the main thread.
        let grid = surface.grid.clone();
        let threshold = surface.threshold();

        match task {
            Some(mut task) => {
                task.0.submit(grid, threshold);
                commands.entity(entity).remove::<QueuedSurface>();
            }
            None => {
                let mut worker = SurfaceWorker::new();
                worker.submit(grid, threshold);
                commands
                    .entity(entity)
                    .insert(SurfaceTask(worker))
                    .remove::<QueuedSurface>();
            }
        }
    }
}

/// Polls workers each frame and inserts [`GeneratedSurface`] when the current generation completes.
///
/// Non-blocking: unfinished requests are retried next frame. A failed extraction is logged
/// and leaves the entity with no surface: a mesh from an earlier threshold is released.
fn poll_surface_tasks(
    mut commands: Commands,
    mut query: Query<(Entity, &mut SurfaceTask, Option<&Mesh3d>)>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    for (entity, mut task, previous) in query.iter_mut() {
        let Some(response) = task.0.poll() else {
            continue;
        };

        match response.outcome {
            Ok(mesh) => {
                commands.entity(entity).insert(GeneratedSurface {
                    generation: response.generation,
                    mesh,
                });
            }
            Err(err) => {
                warn!(
                    ?entity,
                    generation = response.generation,
                    "no isosurface available: {err}"
                );
                if let Some(previous) = previous {
                    meshes.remove(previous.0.id());
                    commands.entity(entity).remove::<Mesh3d>();
                }
            }
        }
    }
}

/// Moves a [`GeneratedSurface`] into the entity's [`Mesh3d`], then removes [`GeneratedSurface`].
///
/// The previously displayed mesh asset is removed from [`Assets<Mesh>`] before the new one
/// is added. An empty extraction leaves the entity without a [`Mesh3d`].
fn upload_surface(
    mut commands: Commands,
    mut query: Query<(Entity, &mut GeneratedSurface, Option<&Mesh3d>)>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    for (entity, mut generated, previous) in query.iter_mut() {
        if let Some(previous) = previous {
            meshes.remove(previous.0.id());
        }

        let mesh = std::mem::take(&mut generated.mesh);
        let mut entity_commands = commands.entity(entity);
        entity_commands.remove::<GeneratedSurface>();

        if mesh.is_empty() {
            entity_commands.remove::<Mesh3d>();
        } else {
            entity_commands.insert(Mesh3d(meshes.add(mesh.into_bevy_mesh())));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use bevy::asset::AssetPlugin;

    use super::*;
    use crate::{
        grid::Bounds,
        types::{Point, Vector},
    };

    /// A signed field with a positive lobe at `+x` and a negative lobe at `-x`.
    fn dumbbell(resolution: usize) -> ScalarGrid {
        let bounds = Bounds::centered(Point::origin(), Vector::new(4.0, 4.0, 4.0)).unwrap();
        ScalarGrid::from_fn(resolution, bounds, &|p: Point| p.x * (-p.coords.norm_squared()).exp())
            .unwrap()
    }

    fn app() -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default(), IsosurfacePlugin::default()))
            .init_asset::<Mesh>();
        app
    }

    fn update_until(app: &mut App, mut done: impl FnMut(&mut App) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(30);
        while !done(app) {
            assert!(Instant::now() < deadline, "surface never uploaded");
            app.update();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn lobe_thresholds_carry_the_sign() {
        assert_eq!(Lobe::Positive.threshold(0.02), 0.02);
        assert_eq!(Lobe::Positive.threshold(-0.02), 0.02);
        assert_eq!(Lobe::Negative.threshold(0.02), -0.02);
    }

    #[test]
    fn lobes_share_one_grid() {
        let [positive, negative] = OrbitalSurface::lobes(dumbbell(8), 0.1);
        assert!(std::sync::Arc::ptr_eq(&positive.grid.values, &negative.grid.values));
        assert_eq!(positive.threshold(), 0.1);
        assert_eq!(negative.threshold(), -0.1);
    }

    #[test]
    fn both_lobes_get_meshes() {
        let mut app = app();
        let [positive, negative] = OrbitalSurface::lobes(dumbbell(24), 0.1);
        let a = app.world_mut().spawn(positive).id();
        let b = app.world_mut().spawn(negative).id();

        update_until(&mut app, |app| {
            app.world().get::<Mesh3d>(a).is_some() && app.world().get::<Mesh3d>(b).is_some()
        });

        let meshes = app.world().resource::<Assets<Mesh>>();
        assert_eq!(meshes.len(), 2);
        assert!(app.world().get::<QueuedSurface>(a).is_none());
        assert!(app.world().get::<GeneratedSurface>(b).is_none());
    }

    #[test]
    fn changing_isovalue_replaces_and_releases_the_mesh() {
        let mut app = app();
        let [positive, _] = OrbitalSurface::lobes(dumbbell(20), 0.1);
        let entity = app.world_mut().spawn(positive).id();

        update_until(&mut app, |app| app.world().get::<Mesh3d>(entity).is_some());
        let first = app.world().get::<Mesh3d>(entity).unwrap().0.id();

        app.world_mut()
            .get_mut::<OrbitalSurface>(entity)
            .unwrap()
            .isovalue = 0.2;

        update_until(&mut app, |app| {
            app.world()
                .get::<Mesh3d>(entity)
                .is_some_and(|mesh| mesh.0.id() != first)
        });

        let meshes = app.world().resource::<Assets<Mesh>>();
        assert!(meshes.get(first).is_none());
        assert_eq!(meshes.len(), 1);
        assert_eq!(
            app.world()
                .get::<SurfaceTask>(entity)
                .unwrap()
                .0
                .current_generation(),
            2
        );
    }

    #[test]
    fn failed_extraction_leaves_entity_without_surface() {
        let mut app = app();
        let [mut positive, _] = OrbitalSurface::lobes(dumbbell(6), 0.1);
        positive.isovalue = Value::NAN;
        let entity = app.world_mut().spawn(positive).id();

        update_until(&mut app, |app| {
            app.world()
                .get::<SurfaceTask>(entity)
                .is_some_and(|task| task.0.is_idle())
        });
        app.update();

        assert!(app.world().get::<Mesh3d>(entity).is_none());
        assert!(app.world().get::<GeneratedSurface>(entity).is_none());
    }

    #[test]
    fn failure_after_success_removes_the_stale_mesh() {
        let mut app = app();
        let [positive, _] = OrbitalSurface::lobes(dumbbell(16), 0.1);
        let entity = app.world_mut().spawn(positive).id();

        update_until(&mut app, |app| app.world().get::<Mesh3d>(entity).is_some());
        let first = app.world().get::<Mesh3d>(entity).unwrap().0.id();

        app.world_mut()
            .get_mut::<OrbitalSurface>(entity)
            .unwrap()
            .isovalue = Value::NAN;

        update_until(&mut app, |app| {
            app.world()
                .get::<SurfaceTask>(entity)
                .is_some_and(|task| task.0.current_generation() == 2 && task.0.is_idle())
        });
        app.update();

        assert!(app.world().get::<Mesh3d>(entity).is_none());
        assert!(app.world().get::<GeneratedSurface>(entity).is_none());
        let meshes = app.world().resource::<Assets<Mesh>>();
        assert!(meshes.get(first).is_none());
        assert_eq!(meshes.len(), 0);
    }
}
