//! Event handling through the full simulation loop.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use hf_sim::{FnImplicitProblem, SimError, Simulator, SolverOptions};
use nalgebra::DVector;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// yd = y with time events at 1 and 3 that reset y to 1.
fn time_event_problem() -> FnImplicitProblem {
    FnImplicitProblem::new()
        .with_name("time events")
        .with_residual(|_t, y, yd, _sw| Ok(yd - y))
        .with_time_events(|state| {
            let sw = state.switches();
            Ok(if sw[0] {
                Some(1.0)
            } else if sw[1] {
                Some(3.0)
            } else {
                None
            })
        })
        .on_event(|state, info| {
            if info.time_event {
                state.y[0] = 1.0;
                state.yd[0] = 1.0;
                if !state.mode.switches[0] {
                    state.mode.switches[1] = false;
                }
                if state.mode.switches[0] {
                    state.mode.switches[0] = false;
                }
            }
            Ok(())
        })
}

fn time_event_sim() -> Simulator<FnImplicitProblem> {
    Simulator::implicit(time_event_problem())
        .y0([1.0])
        .yd0([1.0])
        .switches([true, true])
        .build()
        .unwrap()
}

#[test]
fn time_events_restart_growth() {
    init_tracing();
    let mut sim = time_event_sim();
    sim.simulate(5.0, 0).unwrap();

    let expected = 2.0_f64.exp();
    let y_end = sim.y().last().unwrap()[0];
    assert!((y_end - expected).abs() < 1e-3, "y(5) = {y_end}");
    assert_eq!(*sim.t().last().unwrap(), 5.0);
    assert_eq!(sim.switches(), &[false, false]);

    let stats = sim.stats();
    assert_eq!(stats.time_events, 2);
    assert_eq!(stats.discontinuities, 2);
}

#[test]
fn event_points_are_stored_before_and_after() {
    let mut sim = time_event_sim();
    sim.simulate(2.0, 0).unwrap();
    assert_eq!(*sim.t().last().unwrap(), 2.0);

    let at_event: Vec<usize> = (0..sim.t().len()).filter(|&i| sim.t()[i] == 1.0).collect();
    assert_eq!(at_event.len(), 2);
    let (pre, post) = (at_event[0], at_event[1]);
    assert!((sim.y()[pre][0] - 1.0_f64.exp()).abs() < 1e-3);
    assert_eq!(sim.y()[post][0], 1.0);
}

#[test]
fn without_event_points_only_grid_is_stored() {
    let options = SolverOptions {
        store_event_points: false,
        ..SolverOptions::default()
    };
    let mut sim = Simulator::implicit(time_event_problem())
        .y0([1.0])
        .yd0([1.0])
        .switches([true, true])
        .options(options)
        .build()
        .unwrap();
    sim.simulate(4.0, 4).unwrap();
    assert_eq!(sim.t(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(sim.stats().time_events, 2);
}

/// yd = 1 with an indicator at y = 1.
fn crossing_problem() -> FnImplicitProblem {
    FnImplicitProblem::new()
        .with_residual(|_t, _y, yd, _sw| Ok(yd.add_scalar(-1.0)))
        .with_state_events(1, |_t, y, _yd, _sw| Ok(y.add_scalar(-1.0)))
}

#[test]
fn state_event_flips_switch() {
    init_tracing();
    // (handler already ran, switch seen) for every indicator evaluation
    let seen = Rc::new(RefCell::new(Vec::new()));
    let handled = Rc::new(Cell::new(false));
    let (seen_in, handled_in, handled_ev) = (seen.clone(), handled.clone(), handled.clone());
    let problem = FnImplicitProblem::new()
        .with_residual(|_t, _y, yd, _sw| Ok(yd.add_scalar(-1.0)))
        .with_state_events(1, move |_t, y, _yd, sw| {
            seen_in.borrow_mut().push((handled_in.get(), sw[0]));
            Ok(y.add_scalar(-1.0))
        })
        .on_event(move |state, info| {
            if info.state_events[0] {
                state.mode.switches = vec![false];
                handled_ev.set(true);
            }
            Ok(())
        });
    let mut sim = Simulator::implicit(problem)
        .y0([0.0])
        .yd0([1.0])
        .switches([true])
        .build()
        .unwrap();
    assert_eq!(sim.switches(), &[true]);

    sim.simulate(3.0, 0).unwrap();

    assert_eq!(sim.switches(), &[false]);
    assert_eq!(sim.stats().state_events, 1);
    assert!((sim.y_cur()[0] - 3.0).abs() < 1e-6);

    let seen = seen.borrow();
    assert!(seen.iter().any(|&(after, _)| !after));
    assert!(seen.iter().any(|&(after, _)| after));
    for &(after, sw) in seen.iter() {
        assert_eq!(sw, !after);
    }
}

#[test]
fn handler_changing_problem_data_is_made_consistent() {
    init_tracing();
    // yd = rate, with rate switched from +1 to -1 by a time event at t = 1
    let rate = Rc::new(Cell::new(1.0));
    let (rate_res, rate_te, rate_ev) = (rate.clone(), rate.clone(), rate.clone());
    let problem = FnImplicitProblem::new()
        .with_name("rate change")
        .with_residual(move |_t, _y, yd, _sw| Ok(yd.add_scalar(-rate_res.get())))
        .with_time_events(move |_state| Ok((rate_te.get() > 0.0).then_some(1.0)))
        .on_event(move |_state, info| {
            if info.time_event {
                rate_ev.set(-1.0);
            }
            Ok(())
        });
    let mut sim = Simulator::implicit(problem)
        .y0([0.0])
        .yd0([1.0])
        .build()
        .unwrap();

    sim.simulate(1.0, 0).unwrap();
    assert_eq!(sim.t_cur(), 1.0);
    assert_eq!(sim.stats().time_events, 1);
    assert!((sim.yd_cur()[0] + 1.0).abs() < 1e-9, "yd(1) = {}", sim.yd_cur()[0]);
    assert!((sim.y_cur()[0] - 1.0).abs() < 1e-6);
    let post = sim.yd().last().unwrap()[0];
    assert!((post + 1.0).abs() < 1e-9);

    sim.simulate(2.0, 0).unwrap();
    assert!(sim.y_cur()[0].abs() < 1e-6, "y(2) = {}", sim.y_cur()[0]);
    assert!((sim.yd_cur()[0] + 1.0).abs() < 1e-9);
}

#[test]
fn event_at_same_instant_forever_is_a_loop() {
    let problem = crossing_problem().on_event(|state, _info| {
        state.y[0] = 1.0 - 1e-13;
        Ok(())
    });
    let mut sim = Simulator::implicit(problem)
        .y0([0.0])
        .yd0([1.0])
        .build()
        .unwrap();
    let err = sim.simulate(3.0, 0).unwrap_err();
    match err {
        SimError::DiscontinuityLoop { t, limit } => {
            assert!((t - 1.0).abs() < 1e-6);
            assert_eq!(limit, hf_sim::MAX_EVENT_ITERATIONS);
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(!sim.t().is_empty());
}

#[test]
fn step_event_requests_resolution() {
    let fired = Rc::new(Cell::new(false));
    let seen = Rc::new(Cell::new(0));
    let fired_in = fired.clone();
    let seen_in = seen.clone();
    let problem = FnImplicitProblem::new()
        .with_residual(|_t, y, yd, _sw| Ok(yd + y))
        .on_completed_step(move |_state| Ok(!fired_in.replace(true)))
        .on_event(move |_state, info| {
            assert!(info.step_event);
            assert!(!info.time_event);
            seen_in.set(seen_in.get() + 1);
            Ok(())
        });
    let mut sim = Simulator::implicit(problem)
        .y0([1.0])
        .yd0([-1.0])
        .build()
        .unwrap();
    sim.simulate(1.0, 0).unwrap();

    assert!(fired.get());
    assert_eq!(seen.get(), 1);
    let stats = sim.stats();
    assert_eq!(stats.step_events, 1);
    assert_eq!(stats.discontinuities, 1);
}

#[test]
fn handler_changes_switches_that_select_the_residual() {
    // yd = +1 while the switch is on, -1 afterwards
    let problem = FnImplicitProblem::new()
        .with_residual(|_t, _y, yd, sw| {
            let rate = if sw[0] { 1.0 } else { -1.0 };
            Ok(DVector::from_element(1, yd[0] - rate))
        })
        .with_state_events(1, |_t, y, _yd, _sw| Ok(y.add_scalar(-1.0)))
        .on_event(|state, info| {
            if info.has_state_event() {
                state.mode.switches[0] = false;
            }
            Ok(())
        });
    let mut sim = Simulator::implicit(problem)
        .y0([0.0])
        .yd0([1.0])
        .switches([true])
        .build()
        .unwrap();
    sim.simulate(2.0, 0).unwrap();

    assert!(sim.y_cur()[0].abs() < 1e-6, "y(2) = {}", sim.y_cur()[0]);
    assert!((sim.yd_cur()[0] + 1.0).abs() < 1e-9);
}
