// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end scenarios for the exposed-surface pipeline, CPU device
//! forced so they run on any build machine.

use std::cell::RefCell;
use std::rc::Rc;

use aerovane_core::math::{Mat4, Vec3};
use aerovane_core::{DevicePreference, ExposureConfig, PartId};
use aerovane_silhouette::{ExposedSurfaceEvaluator, SurfaceMesh, ViewRequest};

fn cpu_evaluator(resolution: u32) -> ExposedSurfaceEvaluator {
    let _ = env_logger::builder().is_test(true).try_init();
    ExposedSurfaceEvaluator::new(ExposureConfig {
        render_width: resolution,
        render_height: resolution,
        device_preference: DevicePreference::Cpu,
    })
}

fn drive_to_completion(evaluator: &mut ExposedSurfaceEvaluator) {
    // The render interface is asynchronous even on the CPU path; tick the
    // scheduler until every job drained.
    evaluator.wait_for_update();
}

#[test]
fn cube_area_matches_face_area() {
    let side = 2.0f32;
    let resolution = 512u32;

    let mut evaluator = cpu_evaluator(resolution);
    let mesh = evaluator.add_mesh(SurfaceMesh::cuboid(Vec3::ONE * (side * 0.5)));
    let renderer = evaluator.add_renderer(mesh, Mat4::IDENTITY);
    evaluator.setup_renderer(PartId(0), renderer);

    let measured = Rc::new(RefCell::new(None));
    let sink = measured.clone();
    let per_pixel = Rc::new(RefCell::new(0.0f32));
    let per_pixel_sink = per_pixel.clone();

    evaluator
        .render(
            vec![ViewRequest {
                look_dir: Vec3::X,
                callback: Some(Box::new(move |result, _| {
                    *sink.borrow_mut() = Some(result.areas.clone());
                    *per_pixel_sink.borrow_mut() = result.area_per_pixel;
                })),
                user_data: 0,
            }],
            Mat4::IDENTITY,
            None,
            0,
        )
        .expect("render accepted");

    drive_to_completion(&mut evaluator);

    let areas = measured.borrow().clone().expect("callback fired");
    assert_eq!(areas.len(), 1);

    // Discretization error bound: perimeter * pixel_size.
    let pixel_size = (side + 0.2) / resolution as f32;
    let tolerance = 4.0 * side * pixel_size;
    let expected = side * side;
    assert!(
        (areas[0] - expected).abs() <= tolerance,
        "measured {} vs {expected} (tolerance {tolerance})",
        areas[0]
    );
    assert!(*per_pixel.borrow() > 0.0);
}

#[test]
fn four_directions_three_objects_batch_fires_once() {
    let mut evaluator = cpu_evaluator(256);
    let mesh = evaluator.add_mesh(SurfaceMesh::cuboid(Vec3::ONE * 0.5));

    for (i, offset) in [0.0f32, 2.0, 4.0].iter().enumerate() {
        let renderer =
            evaluator.add_renderer(mesh, Mat4::from_translation(Vec3::new(*offset, 0.0, 0.0)));
        evaluator.setup_renderer(PartId(i as u32), renderer);
    }
    assert_eq!(evaluator.object_count(), 3);

    let directions = [Vec3::X, -Vec3::X, Vec3::Y, Vec3::new(1.0, 1.0, 1.0)];
    let results: Rc<RefCell<Vec<(u64, Vec<f32>, f32)>>> = Rc::new(RefCell::new(Vec::new()));
    let batch_fires = Rc::new(RefCell::new(0u32));

    let requests = directions
        .iter()
        .enumerate()
        .map(|(i, &dir)| {
            let sink = results.clone();
            ViewRequest {
                look_dir: dir,
                callback: Some(Box::new(move |result, user_data| {
                    // The silhouette area of the whole fitted view volume
                    // bounds the per-object sum: no double counting.
                    let silhouette =
                        result.area_per_pixel * (256.0 * 256.0);
                    sink.borrow_mut()
                        .push((user_data, result.areas.clone(), silhouette));
                })),
                user_data: i as u64,
            }
        })
        .collect();

    let fires = batch_fires.clone();
    evaluator
        .render(
            requests,
            Mat4::IDENTITY,
            Some(Box::new(move |_| *fires.borrow_mut() += 1)),
            99,
        )
        .expect("render accepted");

    drive_to_completion(&mut evaluator);

    assert_eq!(*batch_fires.borrow(), 1, "batch callback fires exactly once");
    let results = results.borrow();
    assert_eq!(results.len(), 4);
    for (user_data, areas, silhouette) in results.iter() {
        assert!(*user_data < 4);
        assert_eq!(areas.len(), 3);
        let total: f32 = areas.iter().sum();
        assert!(total > 0.0, "direction {user_data} saw nothing");
        assert!(
            total <= *silhouette + 1e-3,
            "direction {user_data}: sum {total} exceeds projected bound {silhouette}"
        );
    }

    // Looking along +X the three cubes stack behind each other: only the
    // nearest one may own pixels.
    let (_, areas_x, _) = results.iter().find(|(u, _, _)| *u == 0).unwrap();
    let visible = areas_x.iter().filter(|a| **a > 0.01).count();
    assert_eq!(visible, 1, "one cube visible along +X: {areas_x:?}");
}

#[test]
fn render_during_flight_uses_second_batch() {
    let mut evaluator = cpu_evaluator(64);
    let mesh = evaluator.add_mesh(SurfaceMesh::cuboid(Vec3::ONE * 0.5));
    let renderer = evaluator.add_renderer(mesh, Mat4::IDENTITY);
    evaluator.setup_renderer(PartId(0), renderer);

    let request = |count: Rc<RefCell<u32>>| ViewRequest {
        look_dir: Vec3::Z,
        callback: Some(Box::new(move |_, _| *count.borrow_mut() += 1)),
        user_data: 0,
    };

    let completions = Rc::new(RefCell::new(0u32));
    evaluator
        .render(vec![request(completions.clone())], Mat4::IDENTITY, None, 0)
        .expect("first render accepted");
    // The first batch is still in flight; the evaluator pools a second one
    // rather than rejecting the call.
    evaluator
        .render(vec![request(completions.clone())], Mat4::IDENTITY, None, 0)
        .expect("concurrent render accepted via second batch");

    drive_to_completion(&mut evaluator);
    assert_eq!(*completions.borrow(), 2);
}

#[test]
fn empty_scene_and_empty_requests_rejected() {
    let mut evaluator = cpu_evaluator(64);
    assert!(evaluator
        .render(Vec::new(), Mat4::IDENTITY, None, 0)
        .is_err());

    let outcome = evaluator.render(
        vec![ViewRequest {
            look_dir: Vec3::Z,
            callback: None,
            user_data: 0,
        }],
        Mat4::IDENTITY,
        None,
        0,
    );
    assert!(outcome.is_err(), "no renderers registered");
}

#[test]
fn degenerate_direction_dropped_others_complete() {
    let mut evaluator = cpu_evaluator(64);
    let mesh = evaluator.add_mesh(SurfaceMesh::cuboid(Vec3::ONE * 0.5));
    let renderer = evaluator.add_renderer(mesh, Mat4::IDENTITY);
    evaluator.setup_renderer(PartId(0), renderer);

    let completions = Rc::new(RefCell::new(0u32));
    let sink = completions.clone();
    let batch_fired = Rc::new(RefCell::new(false));
    let batch_sink = batch_fired.clone();

    evaluator
        .render(
            vec![
                ViewRequest {
                    look_dir: Vec3::ZERO,
                    callback: Some(Box::new(|_, _| panic!("degenerate request must not run"))),
                    user_data: 0,
                },
                ViewRequest {
                    look_dir: Vec3::Z,
                    callback: Some(Box::new(move |_, _| *sink.borrow_mut() += 1)),
                    user_data: 1,
                },
            ],
            Mat4::IDENTITY,
            Some(Box::new(move |_| *batch_sink.borrow_mut() = true)),
            0,
        )
        .expect("valid direction keeps the batch alive");

    drive_to_completion(&mut evaluator);
    assert_eq!(*completions.borrow(), 1);
    assert!(*batch_fired.borrow());
}
