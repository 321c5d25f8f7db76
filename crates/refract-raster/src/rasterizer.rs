//! The software rasterizer.
//!
//! A pass is replayed in two phases on one [`DebugSession`]: the vertex stage
//! is prepared and run for every vertex of every item, then the pixel stage is
//! prepared once and every covered pixel is shaded through it. Preparing the
//! pixel stage once lets storage-buffer writes accumulate across the pass.

use std::collections::HashMap;
use std::sync::Arc;

use refract_debug::{
    ClipDepth, DebugSession, PixelInput, PixelResult, PixelSample, ShaderStage, VertexInput,
    VertexOutput,
};
use refract_vm::VmSession;
use tracing::{debug, info, trace, warn};

use crate::config::RasterConfig;
use crate::error::{RasterError, Result};
use crate::pass::{split_attributes, DrawItem, Pass, Topology};
use crate::target::{pack_rgba8, unpack_rgba8, RenderTarget, UbCell};
use crate::triangle::{Region, Triangle};
use crate::value_map::{parallel_chunked_map, VariableValueMap};

/// A triangle after the vertex stage.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledTriangle {
    pub vertices: [VertexOutput; 3],
    pub vertex_ids: [u32; 3],
    pub instance_id: u32,
}

/// Aggregate counters since the last `init` or pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RasterStats {
    /// Pixels whose color and depth were written.
    pub pixel_count: u64,
    /// Shaded pixels that were discarded or failed.
    pub pixels_discarded: u64,
    pub triangles: u64,
    /// Degenerate, clipped or incompletely shaded triangles.
    pub triangles_skipped: u64,
    /// Pixel invocations executed.
    pub invocations: u64,
    /// Most instructions executed by one pixel invocation.
    pub heatmap_max: u32,
    /// Mean instructions per pixel invocation.
    pub heatmap_average: f64,
}

/// CPU rasterizer producing color, depth and analysis buffers.
#[derive(Debug)]
pub struct SoftwareRasterizer {
    config: RasterConfig,
    target: RenderTarget,
    clear_color: [f32; 4],
    region: Region,
    stats: RasterStats,
    probes: Vec<[u32; 2]>,
    history: Vec<PixelSample>,
    breakpoint_hits: Vec<[u32; 2]>,
    first_breakpoint: Option<([u32; 2], VmSession)>,
}

impl Default for SoftwareRasterizer {
    fn default() -> Self {
        Self::new(RasterConfig::default())
    }
}

impl SoftwareRasterizer {
    pub fn new(config: RasterConfig) -> Self {
        Self {
            config,
            target: RenderTarget::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            region: Region::default(),
            stats: RasterStats::default(),
            probes: Vec::new(),
            history: Vec::new(),
            breakpoint_hits: Vec::new(),
            first_breakpoint: None,
        }
    }

    pub fn config(&self) -> &RasterConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RasterConfig {
        &mut self.config
    }

    // ========================================================================
    // Target
    // ========================================================================

    /// Allocate every buffer for a `width × height` target and reset the
    /// counters. The region is reset to the whole target.
    pub fn init(&mut self, width: u32, height: u32, clear_color: [f32; 4]) {
        info!(width, height, "render target initialized");
        self.target = RenderTarget::new(width, height);
        self.clear_color = clear_color;
        self.region = Region::full(width, height);
        self.begin_frame();
    }

    /// Restrict rendering to `[x0, x1) × [y0, y1)`. Buffers are cleared.
    pub fn set_region(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) {
        let full = Region::full(self.target.width, self.target.height);
        self.region = Region::new(x0, y0, x1, y1).intersect(full);
        debug!(region = ?self.region, "render region set");
        self.begin_frame();
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn width(&self) -> u32 {
        self.target.width
    }

    pub fn height(&self) -> u32 {
        self.target.height
    }

    fn begin_frame(&mut self) {
        self.target.clear(self.clear_color, self.config.clear_depth);
        self.stats = RasterStats::default();
        self.breakpoint_hits.clear();
        self.first_breakpoint = None;
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(RasterError::NotInitialized);
        }
        Ok(())
    }

    /// Packed `0xAABBGGRR` colors, row-major.
    pub fn color_buffer(&self) -> &[u32] {
        &self.target.color
    }

    pub fn color_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let index = self.target.index(x, y)?;
        Some(unpack_rgba8(self.target.color[index]))
    }

    pub fn depth_buffer(&self) -> &[f32] {
        &self.target.depth
    }

    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        Some(self.target.depth[self.target.index(x, y)?])
    }

    /// Instructions executed by the last invocation at each pixel.
    pub fn instruction_buffer(&self) -> &[u32] {
        &self.target.instructions
    }

    /// Packed [`UbCell`]s; zero where nothing happened.
    pub fn ub_buffer(&self) -> &[u32] {
        &self.target.ub
    }

    pub fn ub_at(&self, x: u32, y: u32) -> Option<UbCell> {
        UbCell::unpack(self.target.ub[self.target.index(x, y)?])
    }

    pub fn breakpoint_buffer(&self) -> &[bool] {
        &self.target.breakpoints
    }

    /// Pixels whose invocation hit a breakpoint, in shading order.
    pub fn breakpoint_hits(&self) -> &[[u32; 2]] {
        &self.breakpoint_hits
    }

    /// Pixel and invocation state of the first breakpoint hit since the
    /// last pass.
    pub fn take_first_breakpoint(&mut self) -> Option<([u32; 2], VmSession)> {
        self.first_breakpoint.take()
    }

    pub fn stats(&self) -> RasterStats {
        self.stats
    }

    pub fn pixel_count(&self) -> u64 {
        self.stats.pixel_count
    }

    pub fn pixels_discarded(&self) -> u64 {
        self.stats.pixels_discarded
    }

    pub fn heatmap_max(&self) -> u32 {
        self.stats.heatmap_max
    }

    pub fn heatmap_average(&self) -> f64 {
        self.stats.heatmap_average
    }

    // ========================================================================
    // Probes and pixel history
    // ========================================================================

    /// Record every invocation that shades `(x, y)` from now on.
    pub fn add_probe(&mut self, x: u32, y: u32) {
        if !self.probes.contains(&[x, y]) {
            self.probes.push([x, y]);
        }
    }

    pub fn remove_probe(&mut self, x: u32, y: u32) -> bool {
        let before = self.probes.len();
        self.probes.retain(|p| *p != [x, y]);
        self.probes.len() != before
    }

    pub fn clear_probes(&mut self) {
        self.probes.clear();
    }

    /// Samples recorded at probed pixels, oldest first.
    pub fn history(&self) -> &[PixelSample] {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut [PixelSample] {
        &mut self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Clear the target and draw every item of `pass` in order.
    pub fn render_pass(&mut self, session: &mut DebugSession, pass: &Pass) -> Result<()> {
        self.ensure_ready()?;
        self.begin_frame();
        info!(pass = %pass.name, items = pass.items.len(), "rendering pass");

        prepare(session, pass, ShaderStage::Vertex)?;
        let assembled: Vec<Vec<AssembledTriangle>> = pass
            .items
            .iter()
            .map(|item| shade_vertices(session, item))
            .collect();

        prepare(session, pass, ShaderStage::Pixel)?;
        for (item, triangles) in pass.items.iter().zip(&assembled) {
            self.draw(session, pass, item, triangles);
        }
        debug!(
            pass = %pass.name,
            pixels = self.stats.pixel_count,
            discarded = self.stats.pixels_discarded,
            triangles = self.stats.triangles,
            skipped = self.stats.triangles_skipped,
            "pass rendered"
        );
        Ok(())
    }

    /// Draw a single item of `pass` over the current buffers.
    pub fn render_primitive(&mut self, session: &mut DebugSession, pass: &Pass, item: &DrawItem) -> Result<()> {
        self.ensure_ready()?;
        prepare(session, pass, ShaderStage::Vertex)?;
        let triangles = shade_vertices(session, item);
        prepare(session, pass, ShaderStage::Pixel)?;
        self.draw(session, pass, item, &triangles);
        Ok(())
    }

    fn draw(&mut self, session: &mut DebugSession, pass: &Pass, item: &DrawItem, triangles: &[AssembledTriangle]) {
        let expected = expected_triangles(item);
        self.stats.triangles_skipped += expected.saturating_sub(triangles.len() as u64);
        let mut written = 0;
        for triangle in triangles {
            written += self.render_triangle(session, pass, item, triangle);
        }
        debug!(item = %item.name, triangles = triangles.len(), written, "item drawn");
    }

    /// Shade every covered pixel of `triangle`. The session must have the
    /// pass's pixel stage prepared. Returns the pixels written.
    pub fn render_triangle(
        &mut self,
        session: &mut DebugSession,
        pass: &Pass,
        item: &DrawItem,
        triangle: &AssembledTriangle,
    ) -> u32 {
        if session.stage() != Some(ShaderStage::Pixel) {
            warn!(item = %item.name, "pixel stage is not prepared; triangle skipped");
            return 0;
        }
        let Some(setup) = Triangle::setup(
            &triangle.vertices,
            self.target.width,
            self.target.height,
            self.config.subpixel_bits,
        ) else {
            debug!(item = %item.name, ids = ?triangle.vertex_ids, "degenerate triangle skipped");
            self.stats.triangles_skipped += 1;
            return 0;
        };
        self.stats.triangles += 1;

        let region = self.region;
        let block = self.config.block_size;
        let front_facing = setup.front_facing;
        let mut written = 0;
        setup.for_each_covered(region, block, |x, y, weights| {
            let input = PixelInput {
                position: [x as f32 + 0.5, y as f32 + 0.5],
                vertices: triangle.vertices.clone(),
                weights,
                front_facing,
            };
            if self.shade_pixel(session, pass, item, triangle, &input, [x, y]) {
                written += 1;
            }
        });
        written
    }

    fn shade_pixel(
        &mut self,
        session: &mut DebugSession,
        pass: &Pass,
        item: &DrawItem,
        triangle: &AssembledTriangle,
        input: &PixelInput,
        [x, y]: [u32; 2],
    ) -> bool {
        let Some(index) = self.target.index(x, y) else {
            return false;
        };
        let depth = input.depth(session.config().clip_depth);
        if !pass.depth_func.passes(depth, self.target.depth[index]) {
            return false;
        }

        session.set_pixel_shader_input(input);
        let result = if self.config.breakpoint_aware {
            session.execute_pixel_shader_with_breakpoints()
        } else {
            session.execute_pixel_shader()
        };
        let Some(result) = result else {
            self.stats.pixels_discarded += 1;
            return false;
        };

        self.record_heat(index, result.instruction_count);
        if let Some(ub) = result.ub {
            self.target
                .record_ub(index, ub.kind, ub.line.unwrap_or(0), result.ub_count);
        }
        if result.breakpoint_hit {
            self.target.breakpoints[index] = true;
            self.breakpoint_hits.push([x, y]);
            let snapshot = session.take_breakpoint_snapshot();
            if self.first_breakpoint.is_none() {
                self.first_breakpoint = snapshot.map(|vm| ([x, y], vm));
            }
        }
        if self.probes.contains(&[x, y]) {
            self.record_history(pass, item, triangle, input, &result, [x, y]);
        }

        if result.discarded {
            trace!(x, y, "pixel discarded");
            self.stats.pixels_discarded += 1;
            return false;
        }
        self.target.color[index] = pack_rgba8(result.color);
        self.target.depth[index] = result.depth;
        self.stats.pixel_count += 1;
        trace!(x, y, depth = result.depth, "pixel written");
        true
    }

    fn record_heat(&mut self, index: usize, instructions: u64) {
        let count = u32::try_from(instructions).unwrap_or(u32::MAX);
        self.target.instructions[index] = count;
        let stats = &mut self.stats;
        stats.invocations += 1;
        stats.heatmap_max = stats.heatmap_max.max(count);
        stats.heatmap_average += (f64::from(count) - stats.heatmap_average) / stats.invocations as f64;
    }

    fn record_history(
        &mut self,
        pass: &Pass,
        item: &DrawItem,
        triangle: &AssembledTriangle,
        input: &PixelInput,
        result: &PixelResult,
        [x, y]: [u32; 2],
    ) {
        let sample = PixelSample {
            coordinate: [x, y],
            normalized: [
                input.position[0] / self.target.width as f32,
                input.position[1] / self.target.height as f32,
            ],
            pass: pass.name.clone(),
            object: item.name.clone(),
            vertex_ids: triangle.vertex_ids,
            instance_id: triangle.instance_id,
            vertices: triangle.vertices.to_vec(),
            weights: input.weights,
            front_facing: input.front_facing,
            varyings: input.varyings(),
            color: result.color,
            reexecuted_color: None,
            fetched: false,
            discarded: result.discarded,
            instruction_count: result.instruction_count,
            ub: result.ub,
            ub_count: result.ub_count,
        };
        let duplicate = self.history.iter().any(|s| {
            s.coordinate == sample.coordinate && s.pass == sample.pass && s.same_source(&sample)
        });
        if !duplicate {
            trace!(x, y, object = %item.name, "pixel history recorded");
            self.history.push(sample);
        }
    }

    /// Run `sample` again with the pass's pixel stage and store the color it
    /// produces now. Marks the sample as fetched.
    pub fn reexecute_sample(&self, session: &mut DebugSession, pass: &Pass, sample: &mut PixelSample) -> bool {
        let prepared = session.prepare_stage(
            ShaderStage::Pixel,
            &pass.pixel_module,
            Arc::clone(&pass.bindings),
            Some(&*sample),
        );
        if let Err(err) = prepared {
            warn!(pass = %pass.name, %err, "sample could not be re-executed");
            return false;
        }
        let Some(result) = session.execute_pixel_shader() else {
            return false;
        };
        sample.reexecuted_color = Some(result.color);
        sample.fetched = true;
        true
    }

    // ========================================================================
    // Variable value maps
    // ========================================================================

    /// Re-run every visible pixel of `pass` up to `line` and collect the
    /// value of `variable` there.
    ///
    /// Visibility is resolved with interpolated depth only; the fragments
    /// that win are then re-executed in parallel, each on its own VM clone.
    /// `None` when a stage cannot be prepared or no pixel reads the variable.
    pub fn allocate_variable_value_map(
        &self,
        session: &mut DebugSession,
        pass: &Pass,
        variable: &str,
        line: u32,
    ) -> Option<VariableValueMap> {
        self.ensure_ready().ok()?;
        if let Err(err) = prepare(session, pass, ShaderStage::Vertex) {
            warn!(%err, "value map skipped");
            return None;
        }
        let assembled: Vec<AssembledTriangle> = pass
            .items
            .iter()
            .flat_map(|item| shade_vertices(session, item))
            .collect();
        if let Err(err) = prepare(session, pass, ShaderStage::Pixel) {
            warn!(%err, "value map skipped");
            return None;
        }
        let runner = session.pixel_runner()?;

        let fragments = self.resolve_visible(pass, &assembled, session.config().clip_depth);
        info!(variable, line, fragments = fragments.len(), "building variable value map");
        let results = parallel_chunked_map(
            &fragments,
            |(index, input)| (*index, runner.variable_at(input, variable, line).map(|v| v.to_f32s())),
            self.config.value_map_chunk,
            self.config.serial_threshold,
        );

        let components = results
            .iter()
            .find_map(|(_, data)| data.as_ref().filter(|d| !d.is_empty()))
            .map(|d| d.len().clamp(1, 4) as u32)?;
        let mut map = VariableValueMap::new(self.target.width, self.target.height, components);
        for (index, data) in results {
            if let Some(data) = data {
                map.set(index, &data);
            }
        }
        Some(map)
    }

    /// The depth-winning fragment of every covered pixel in the region.
    fn resolve_visible(
        &self,
        pass: &Pass,
        triangles: &[AssembledTriangle],
        clip: ClipDepth,
    ) -> Vec<(usize, PixelInput)> {
        let len = self.target.color.len();
        let mut depth = vec![self.config.clear_depth; len];
        let mut winners: Vec<Option<PixelInput>> = vec![None; len];
        for triangle in triangles {
            let Some(setup) = Triangle::setup(
                &triangle.vertices,
                self.target.width,
                self.target.height,
                self.config.subpixel_bits,
            ) else {
                continue;
            };
            setup.for_each_covered(self.region, self.config.block_size, |x, y, weights| {
                let Some(index) = self.target.index(x, y) else {
                    return;
                };
                let input = PixelInput {
                    position: [x as f32 + 0.5, y as f32 + 0.5],
                    vertices: triangle.vertices.clone(),
                    weights,
                    front_facing: setup.front_facing,
                };
                let d = input.depth(clip);
                if pass.depth_func.passes(d, depth[index]) {
                    depth[index] = d;
                    winners[index] = Some(input);
                }
            });
        }
        winners
            .into_iter()
            .enumerate()
            .filter_map(|(index, input)| Some((index, input?)))
            .collect()
    }
}

fn prepare(session: &mut DebugSession, pass: &Pass, stage: ShaderStage) -> Result<()> {
    let module = match stage {
        ShaderStage::Vertex => &pass.vertex_module,
        _ => &pass.pixel_module,
    };
    session
        .prepare_stage(stage, module, Arc::clone(&pass.bindings), None)
        .map_err(|source| RasterError::Prepare {
            pass: pass.name.clone(),
            stage,
            source,
        })
}

/// Corner indices of each triangle, as positions into the vertex order.
pub fn assemble(topology: Topology, vertex_count: usize) -> Vec<[usize; 3]> {
    match topology {
        Topology::TriangleList => (0..vertex_count / 3)
            .map(|t| [3 * t, 3 * t + 1, 3 * t + 2])
            .collect(),
        Topology::TriangleStrip => (0..vertex_count.saturating_sub(2))
            .map(|i| if i % 2 == 0 { [i, i + 1, i + 2] } else { [i + 1, i, i + 2] })
            .collect(),
        Topology::TriangleFan => (1..vertex_count.saturating_sub(1))
            .map(|i| [0, i, i + 1])
            .collect(),
        Topology::PointList | Topology::LineList | Topology::LineStrip => Vec::new(),
    }
}

fn expected_triangles(item: &DrawItem) -> u64 {
    let per_instance = assemble(item.topology, item.vertex_order().len()).len() as u64;
    per_instance * u64::from(item.instances)
}

/// Run the prepared vertex stage over `item` and assemble its triangles.
/// Triangles with a vertex that failed to shade are dropped.
fn shade_vertices(session: &mut DebugSession, item: &DrawItem) -> Vec<AssembledTriangle> {
    if !item.topology.is_triangles() {
        warn!(item = %item.name, topology = ?item.topology, "only triangle topologies are rasterized");
        return Vec::new();
    }
    let order = item.vertex_order();
    let corners = assemble(item.topology, order.len());
    let layout = item.source.layout().to_vec();
    let mut triangles = Vec::with_capacity(corners.len() * item.instances as usize);

    for instance_id in 0..item.instances {
        let mut cache: HashMap<u32, Option<VertexOutput>> = HashMap::new();
        let mut shade = |vertex_id: u32| -> Option<VertexOutput> {
            cache
                .entry(vertex_id)
                .or_insert_with(|| {
                    let data = item.source.vertex_attributes(vertex_id)?;
                    let input = VertexInput {
                        vertex_id,
                        instance_id,
                        attributes: split_attributes(&layout, &data),
                    };
                    if !session.set_vertex_shader_input(&input) {
                        return None;
                    }
                    session.execute_vertex_shader()
                })
                .clone()
        };
        for [a, b, c] in &corners {
            let vertex_ids = [order[*a], order[*b], order[*c]];
            let shaded = [shade(vertex_ids[0]), shade(vertex_ids[1]), shade(vertex_ids[2])];
            let [Some(v0), Some(v1), Some(v2)] = shaded else {
                debug!(item = %item.name, ids = ?vertex_ids, "triangle dropped: vertex failed");
                continue;
            };
            triangles.push(AssembledTriangle {
                vertices: [v0, v1, v2],
                vertex_ids,
                instance_id,
            });
        }
    }
    trace!(item = %item.name, triangles = triangles.len(), "vertices shaded");
    triangles
}
