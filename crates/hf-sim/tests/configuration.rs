//! Construction, option validation and error reporting.

use hf_core::AbsTol;
use hf_sim::{FnImplicitProblem, ProblemError, SimError, Simulator, SolverOptions};

fn decay() -> FnImplicitProblem {
    FnImplicitProblem::new().with_residual(|_t, y, yd, _sw| Ok(yd + y))
}

fn decay_sim() -> Simulator<FnImplicitProblem> {
    Simulator::implicit(decay())
        .y0([1.0])
        .yd0([-1.0])
        .build()
        .unwrap()
}

#[test]
fn missing_residual_is_reported_on_first_use() {
    let mut sim = Simulator::implicit(FnImplicitProblem::new())
        .y0([1.0])
        .build()
        .unwrap();
    let err = sim.simulate(1.0, 0).unwrap_err();
    assert!(matches!(
        err,
        SimError::ProblemNotSpecified { what: "residual" }
    ));
}

#[test]
fn invalid_construction_is_rejected() {
    let missing = Simulator::implicit(decay()).build();
    assert!(matches!(missing, Err(SimError::Configuration { .. })));

    let empty = Simulator::implicit(decay()).y0(Vec::<f64>::new()).build();
    assert!(matches!(empty, Err(SimError::Configuration { .. })));

    let short = Simulator::implicit(decay()).y0([1.0, 2.0]).yd0([0.0]).build();
    assert!(matches!(short, Err(SimError::Configuration { .. })));

    let nan = Simulator::implicit(decay()).y0([f64::NAN]).build();
    assert!(matches!(nan, Err(SimError::Configuration { .. })));

    let bad_algvar = Simulator::implicit(decay()).y0([1.0]).algvar([0.5]).build();
    assert!(matches!(bad_algvar, Err(SimError::Configuration { .. })));

    let options = SolverOptions {
        atol: AbsTol::PerComponent(vec![1e-6, 1e-6]),
        ..SolverOptions::default()
    };
    let bad_atol = Simulator::implicit(decay()).y0([1.0]).options(options).build();
    assert!(matches!(bad_atol, Err(SimError::Configuration { .. })));
}

#[test]
fn end_time_must_be_ahead() {
    let mut sim = decay_sim();
    assert!(matches!(
        sim.simulate(0.0, 0),
        Err(SimError::TimeOrdering { .. })
    ));
    assert!(matches!(
        sim.simulate(f64::NAN, 0),
        Err(SimError::TimeOrdering { .. })
    ));
    sim.simulate(1.0, 0).unwrap();
    assert!(matches!(
        sim.simulate(0.5, 0),
        Err(SimError::TimeOrdering { t_end, .. }) if t_end == 0.5
    ));
}

#[test]
fn setters_validate_and_clamp() {
    let mut sim = Simulator::implicit(decay())
        .y0([1.0])
        .switches([true, false])
        .build()
        .unwrap();

    assert!(sim.set_switches([true]).is_err());
    sim.set_switches([false, false]).unwrap();
    assert_eq!(sim.switches(), &[false, false]);

    sim.set_maxord(9);
    assert_eq!(sim.maxord(), 5);
    sim.set_maxord(0);
    assert_eq!(sim.maxord(), 1);

    assert!(sim.set_atol(AbsTol::PerComponent(vec![1e-6, 1e-6])).is_err());
    sim.set_atol(AbsTol::PerComponent(vec![1e-8])).unwrap();
    assert_eq!(sim.atol(), &AbsTol::PerComponent(vec![1e-8]));
    assert!(sim.set_rtol(-1.0).is_err());
    assert_eq!(sim.rtol(), 1e-6);

    assert!(sim.set_initstep(Some(-1.0)).is_err());
    sim.set_initstep(Some(1e-4)).unwrap();
    assert_eq!(sim.initstep(), Some(1e-4));
    assert!(sim.set_maxh(Some(0.0)).is_err());
    assert!(sim.set_maxsteps(0).is_err());
    assert!(sim.set_algvar([1.0, 0.0]).is_err());

    sim.set_lsoff(true);
    assert!(sim.lsoff());
}

#[test]
fn step_budget_keeps_partial_trajectory() {
    let mut sim = decay_sim();
    sim.set_maxsteps(5).unwrap();
    let err = sim.simulate(10.0, 0).unwrap_err();
    match err {
        SimError::TooManySteps { t, maxsteps } => {
            assert_eq!(maxsteps, 5);
            assert_eq!(t, sim.t_cur());
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(sim.t().len(), 6);
    assert!(sim.t_cur() > 0.0 && sim.t_cur() < 10.0);

    // the budget is per call: continuing works
    sim.set_maxsteps(10_000).unwrap();
    sim.simulate(10.0, 0).unwrap();
    assert_eq!(sim.t_cur(), 10.0);
}

#[test]
fn callback_errors_propagate() {
    let problem = FnImplicitProblem::new().with_residual(|t, y, yd, _sw| {
        if t > 0.5 {
            return Err(ProblemError::callback("residual blew up"));
        }
        Ok(yd + y)
    });
    let mut sim = Simulator::implicit(problem)
        .y0([1.0])
        .yd0([-1.0])
        .build()
        .unwrap();
    let err = sim.simulate(1.0, 0).unwrap_err();
    assert!(matches!(err, SimError::Callback(_)), "{err}");
    assert!(err.to_string().contains("residual blew up"));
    assert!(sim.t_cur() <= 0.5);
}

#[test]
fn options_from_yaml_drive_the_run() {
    let options = SolverOptions::from_yaml_str("rtol: 1.0e-6\natol: 1.0e-8\nmaxord: 1\n").unwrap();
    let mut sim = Simulator::implicit(decay())
        .y0([1.0])
        .yd0([-1.0])
        .options(options)
        .build()
        .unwrap();
    assert_eq!(sim.maxord(), 1);
    sim.simulate(1.0, 0).unwrap();
    assert!((sim.y_cur()[0] - (-1.0_f64).exp()).abs() < 2e-3);
}

#[test]
fn initial_conditions_are_kept_for_reset() {
    let mut sim = decay_sim();
    sim.simulate(1.0, 0).unwrap();
    let initial = sim.initial_conditions();
    assert_eq!(initial.t0, 0.0);
    assert_eq!(initial.y0[0], 1.0);
    assert_eq!(initial.yd0[0], -1.0);
    assert!(initial.switches0.is_empty());
    assert_eq!(sim.state().dim(), 1);
}
