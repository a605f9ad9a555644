use axon_nn::{Session, TeachResult, Teacher};

fn main() {
    let mut session = Session::with_seed(42);
    session.new_net();

    // 2-2-1 net, logistic activations throughout.
    let net = session.net_mut().unwrap();
    let i1 = net.add_input("In1");
    let i2 = net.add_input("In2");
    let h1 = net.add_hidden("H1");
    let h2 = net.add_hidden("H2");
    let o = net.add_output("Out");
    for (from, to) in [(i1, h1), (i1, h2), (i2, h1), (i2, h2), (h1, o), (h2, o)] {
        net.add_link(from, to).unwrap();
    }

    let lesson = session.lesson_mut();
    lesson.set_input_count(2).unwrap();
    lesson.set_output_count(1).unwrap();
    for (a, b, y) in [(0.0, 0.0, 0.0), (0.0, 1.0, 1.0), (1.0, 0.0, 1.0), (1.0, 1.0, 0.0)] {
        lesson.add_pattern();
        lesson.set_pattern_input(0, a).unwrap();
        lesson.set_pattern_input(1, b).unwrap();
        lesson.set_pattern_output(0, y).unwrap();
    }

    session.add_teacher(Teacher::new("XOR Teacher", 0.5, 1e-3)).unwrap();
    session.select_teacher("XOR Teacher").unwrap();
    session.randomize_net().unwrap();

    let mut previous_error = f64::MAX;
    loop {
        let result = session.teach_step().unwrap();
        let error = session.last_net_error();
        let step = session.teach_steps_done();
        if step % 1000 == 0 {
            println!("Step {step}: net error = {error:.6}");
        }
        // Bail out once the error stops moving.
        let stalled = (previous_error - error).abs() < 1e-12;
        previous_error = error;
        if !result.can_continue() || stalled || step >= 100_000 {
            if result == TeachResult::TargetNetErrorReached {
                println!("Converged after {step} step(s), net error = {error:.6}");
            } else {
                println!("Stopped after {step} step(s), net error = {error:.6} ({result:?})");
            }
            break;
        }
    }
    session.stop_teaching();

    for (a, b) in [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)] {
        let net = session.net_mut().unwrap();
        net.apply_input_act(0, a).unwrap();
        net.apply_input_act(1, b).unwrap();
        net.think_step();
        println!("Input: [{a}, {b}] -> Output: {:.4}", net.output_out(0).unwrap());
    }
}
