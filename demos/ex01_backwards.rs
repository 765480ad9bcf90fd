use microdiff::{zero_grad, Var};

fn main() {
    let a = Var::with_label(2.0, "a");
    let b = Var::with_label(-3.0, "b");
    let c = Var::with_label(10.0, "c");
    let e = &a * &b;
    let d = &e + &c;
    let f = Var::with_label(-2.0, "f");
    let loss = &d * &f;
    loss.set_label("L");

    // Perform the backward pass wrt `loss` and print the gradients
    loss.backward();
    for node in loss.topological_order().iter().rev() {
        println!(
            "{:>4} {:>5} data={:>6} grad={:>6}",
            node.label().unwrap_or_default(),
            node.op().to_string(),
            node.data(),
            node.grad()
        );
    }

    // reset the gradients
    zero_grad([&loss]);

    // a node used twice collects both contributions
    let twice = &a + &a;
    twice.backward();
    println!("∂(a + a)/∂a = {}", a.grad()); // 2
}
