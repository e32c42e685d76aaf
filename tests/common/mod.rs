//! A small stack machine that runs pipelines so derived inverses can be checked by behavior

#![allow(dead_code)]

use uiua_invert::{
    match_pattern, Assembly, ImplPrimitive, Node, Primitive, SigNode, Value,
};

pub type RunResult<T = ()> = Result<T, String>;

/// Run a pipeline on some inputs
///
/// The last input is the top of the stack. The results are returned in the same order.
pub fn run(asm: &Assembly, node: &Node, inputs: Vec<Value>) -> RunResult<Vec<Value>> {
    let mut machine = Machine::new(asm);
    machine.stack = inputs;
    machine.run(node)?;
    if !machine.under.is_empty() {
        return Err(format!("{} values left on the under stack", machine.under.len()));
    }
    Ok(machine.stack)
}

pub struct Machine<'a> {
    asm: &'a Assembly,
    pub stack: Vec<Value>,
    under: Vec<Value>,
    clock: f64,
}

impl<'a> Machine<'a> {
    pub fn new(asm: &'a Assembly) -> Self {
        Machine {
            asm,
            stack: Vec::new(),
            under: Vec::new(),
            clock: 0.0,
        }
    }
    fn pop(&mut self) -> RunResult<Value> {
        self.stack.pop().ok_or_else(|| "stack is empty".to_string())
    }
    fn pop_n(&mut self, n: usize) -> RunResult<Vec<Value>> {
        if self.stack.len() < n {
            return Err(format!("expected {n} values, found {}", self.stack.len()));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }
    fn push(&mut self, val: impl Into<Value>) {
        self.stack.push(val.into());
    }
    pub fn run(&mut self, node: &Node) -> RunResult {
        match node {
            Node::Run(nodes) => nodes.iter().try_for_each(|node| self.run(node)),
            Node::Push(val) => {
                self.push(val.clone());
                Ok(())
            }
            Node::Prim(prim, _) => self.prim(*prim),
            Node::ImplPrim(prim, span) => self.impl_prim(*prim, *span),
            Node::Mod(prim, ops, _) => self.modifier(*prim, ops),
            Node::ImplMod(ImplPrimitive::UnScan, ops, _) => {
                let f = &ops[0];
                let xs = list(self.pop()?)?;
                let mut out = Vec::with_capacity(xs.len());
                for (i, x) in xs.iter().enumerate() {
                    if i == 0 {
                        out.push(x.clone());
                    } else {
                        out.push(self.call_with(f, vec![x.clone(), xs[i - 1].clone()])?);
                    }
                }
                self.push(Value::from_iter(out));
                Ok(())
            }
            Node::ImplMod(ImplPrimitive::RepeatWithInverse, ops, _) => {
                let n = num(&self.pop()?)?;
                if n.fract() != 0.0 {
                    return Err(format!("expected an integer, found {n}"));
                }
                let f = if n < 0.0 { &ops[1] } else { &ops[0] };
                for _ in 0..n.abs() as usize {
                    self.run(&f.node)?;
                }
                Ok(())
            }
            Node::ImplMod(prim, ..) => Err(format!("{prim} is not a modifier")),
            Node::Call(f, _) => {
                let body = self.asm.get(f).ok_or("function not found")?.clone();
                self.run(&body)
            }
            Node::PushUnder(n, _) => {
                let vals = self.pop_n(*n)?;
                self.under.extend(vals);
                Ok(())
            }
            Node::CopyToUnder(n, _) => {
                let vals = self.pop_n(*n)?;
                self.under.extend(vals.iter().cloned());
                self.stack.extend(vals);
                Ok(())
            }
            Node::PopUnder(n, _) => {
                if self.under.len() < *n {
                    return Err("under stack is empty".into());
                }
                let vals = self.under.split_off(self.under.len() - n);
                self.stack.extend(vals);
                Ok(())
            }
        }
    }
    /// Run a function on its own stack and return its single output
    fn call_with(&self, f: &SigNode, args: Vec<Value>) -> RunResult<Value> {
        let mut sub = Machine::new(self.asm);
        sub.stack = args;
        sub.run(&f.node)?;
        sub.pop()
    }
    fn prim(&mut self, prim: Primitive) -> RunResult {
        use Primitive::*;
        match prim {
            Identity => {
                let a = self.pop()?;
                self.push(a);
            }
            Pop => {
                self.pop()?;
            }
            Dup => {
                let a = self.pop()?;
                self.push(a.clone());
                self.push(a);
            }
            Flip => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.push(a);
                self.push(b);
            }
            Over => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.push(b.clone());
                self.push(a);
                self.push(b);
            }
            Not => self.monadic(|x| 1.0 - x)?,
            Sign => self.monadic(f64::signum_or_zero)?,
            Neg => self.monadic(|x| -x)?,
            Abs => self.monadic(f64::abs)?,
            Sqrt => self.monadic(f64::sqrt)?,
            Sin => self.monadic(f64::sin)?,
            Ln => self.monadic(f64::ln)?,
            Floor => self.monadic(f64::floor)?,
            Ceil => self.monadic(f64::ceil)?,
            Round => self.monadic(f64::round)?,
            Add => self.dyadic(|a, b| b + a)?,
            Sub => self.dyadic(|a, b| b - a)?,
            Mul => self.dyadic(|a, b| b * a)?,
            Div => self.dyadic(|a, b| b / a)?,
            Modulo => self.dyadic(|a, b| b - a * (b / a).floor())?,
            Pow => self.dyadic(|a, b| b.powf(a))?,
            Log => self.dyadic(|a, b| b.ln() / a.ln())?,
            Min => self.dyadic(f64::min)?,
            Max => self.dyadic(f64::max)?,
            Len => {
                let a = self.pop()?;
                self.push(a.row_count());
            }
            Range => {
                let n = nat(&self.pop()?)?;
                self.push(Value::from_iter((0..n).map(Value::from)));
            }
            First => {
                let xs = list(self.pop()?)?;
                self.push(xs.first().cloned().ok_or("first of empty list")?);
            }
            Last => {
                let xs = list(self.pop()?)?;
                self.push(xs.last().cloned().ok_or("last of empty list")?);
            }
            Reverse => {
                let xs = list(self.pop()?)?;
                self.push(Value::from_iter(xs.into_iter().rev()));
            }
            Sort => {
                let mut xs = list(self.pop()?)?;
                let nums = xs.iter().map(num).collect::<RunResult<Vec<_>>>()?;
                let mut pairs: Vec<_> = nums.into_iter().zip(xs.drain(..)).collect();
                pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
                self.push(Value::from_iter(pairs.into_iter().map(|(_, v)| v)));
            }
            Rise => {
                let xs = list(self.pop()?)?;
                let nums = xs.iter().map(num).collect::<RunResult<Vec<_>>>()?;
                let mut indices: Vec<usize> = (0..nums.len()).collect();
                indices.sort_by(|&i, &j| nums[i].total_cmp(&nums[j]));
                self.push(Value::from_iter(indices.into_iter().map(Value::from)));
            }
            Join => {
                let a = self.pop()?;
                let b = self.pop()?;
                let mut joined = rows(a);
                joined.extend(rows(b));
                self.push(Value::from_iter(joined));
            }
            Couple => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.push(Value::from_iter([a, b]));
            }
            Rotate => {
                let n = num(&self.pop()?)?;
                let mut xs = list(self.pop()?)?;
                if !xs.is_empty() {
                    let by = (n as isize).rem_euclid(xs.len() as isize) as usize;
                    xs.rotate_left(by);
                }
                self.push(Value::from_iter(xs));
            }
            Take => {
                let n = nat(&self.pop()?)?;
                let xs = list(self.pop()?)?;
                self.push(Value::from_iter(xs.into_iter().take(n)));
            }
            Drop => {
                let n = nat(&self.pop()?)?;
                let xs = list(self.pop()?)?;
                self.push(Value::from_iter(xs.into_iter().skip(n)));
            }
            Pick => {
                let i = nat(&self.pop()?)?;
                let xs = list(self.pop()?)?;
                self.push(xs.get(i).cloned().ok_or("index out of bounds")?);
            }
            Select => {
                let indices = list(self.pop()?)?;
                let xs = list(self.pop()?)?;
                let mut rows = Vec::with_capacity(indices.len());
                for i in &indices {
                    rows.push(xs.get(nat(i)?).cloned().ok_or("index out of bounds")?);
                }
                self.push(Value::from_iter(rows));
            }
            Now => {
                self.clock += 1.0;
                self.push(self.clock);
            }
            prim => return Err(format!("{prim} is a modifier")),
        }
        Ok(())
    }
    fn impl_prim(&mut self, prim: ImplPrimitive, span: usize) -> RunResult {
        use ImplPrimitive::*;
        match prim {
            Root => self.dyadic(|a, b| b.powf(1.0 / a))?,
            Asin => self.monadic(f64::asin)?,
            Exp => self.monadic(f64::exp)?,
            UnAdd => {
                let x = num(&self.pop()?)?;
                self.push(x.fract());
                self.push(x.trunc());
            }
            UnMul => {
                let x = num(&self.pop()?)?;
                self.push(x.abs());
                self.push(x.signum_or_zero());
            }
            UnCouple => {
                let xs = list(self.pop()?)?;
                let [a, b] = <[Value; 2]>::try_from(xs).map_err(|_| "expected two rows")?;
                self.push(b);
                self.push(a);
            }
            UnJoin => {
                let mut xs = list(self.pop()?)?;
                if xs.is_empty() {
                    return Err("cannot split an empty list".into());
                }
                let first = xs.remove(0);
                self.push(Value::from_iter(xs));
                self.push(first);
            }
            UnRange => {
                let xs = list(self.pop()?)?;
                for (i, x) in xs.iter().enumerate() {
                    if *x != Value::from(i) {
                        return Err("not a range".into());
                    }
                }
                self.push(xs.len());
            }
            MatchPattern => {
                let expected = self.pop()?;
                let actual = self.pop()?;
                match_pattern(&expected, &actual, span).map_err(|e| e.to_string())?;
            }
            UndoFirst | UndoLast => {
                let mut orig = list(self.pop()?)?;
                let new = self.pop()?;
                let i = if prim == UndoFirst { 0 } else { orig.len().wrapping_sub(1) };
                *orig.get_mut(i).ok_or("list is empty")? = new;
                self.push(Value::from_iter(orig));
            }
            UndoPick => {
                let i = nat(&self.pop()?)?;
                let mut orig = list(self.pop()?)?;
                let new = self.pop()?;
                *orig.get_mut(i).ok_or("index out of bounds")? = new;
                self.push(Value::from_iter(orig));
            }
            UndoSelect => {
                let indices = list(self.pop()?)?;
                let mut orig = list(self.pop()?)?;
                let new = list(self.pop()?)?;
                for (i, row) in indices.iter().zip(new) {
                    *orig.get_mut(nat(i)?).ok_or("index out of bounds")? = row;
                }
                self.push(Value::from_iter(orig));
            }
            UndoTake => {
                let n = nat(&self.pop()?)?;
                let orig = list(self.pop()?)?;
                let mut new = list(self.pop()?)?;
                new.extend(orig.into_iter().skip(n));
                self.push(Value::from_iter(new));
            }
            UndoDrop => {
                let n = nat(&self.pop()?)?;
                let orig = list(self.pop()?)?;
                let new = list(self.pop()?)?;
                let mut rows: Vec<Value> = orig.into_iter().take(n).collect();
                rows.extend(new);
                self.push(Value::from_iter(rows));
            }
            SetSign => self.dyadic(|a, b| b.abs() * a)?,
            UnScan | RepeatWithInverse => return Err(format!("{prim} is a modifier")),
        }
        Ok(())
    }
    fn modifier(&mut self, prim: Primitive, ops: &[SigNode]) -> RunResult {
        use Primitive::*;
        match prim {
            Dip => {
                let a = self.pop()?;
                self.run(&ops[0].node)?;
                self.push(a);
            }
            On => {
                let a = self.stack.last().cloned().ok_or("stack is empty")?;
                self.run(&ops[0].node)?;
                self.push(a);
            }
            By => {
                let n = ops[0].sig.args().max(1);
                if self.stack.len() < n {
                    return Err("not enough values for by".into());
                }
                let last = self.stack[self.stack.len() - n].clone();
                self.stack.insert(self.stack.len() - n, last);
                self.run(&ops[0].node)?;
            }
            Both => {
                let upper = self.pop_n(ops[0].sig.args())?;
                self.run(&ops[0].node)?;
                self.stack.extend(upper);
                self.run(&ops[0].node)?;
            }
            Fork => {
                let (f, g) = (&ops[0], &ops[1]);
                let n = f.sig.args().max(g.sig.args());
                let args = self.pop_n(n)?;
                self.stack.extend(args[n - g.sig.args()..].iter().cloned());
                self.run(&g.node)?;
                self.stack.extend(args[n - f.sig.args()..].iter().cloned());
                self.run(&f.node)?;
            }
            Bracket => {
                let (f, g) = (&ops[0], &ops[1]);
                let f_args = self.pop_n(f.sig.args())?;
                self.run(&g.node)?;
                self.stack.extend(f_args);
                self.run(&f.node)?;
            }
            Rows | Each => {
                let f = &ops[0];
                let args = self.pop_n(f.sig.args())?;
                let len = args.iter().map(Value::row_count).max().unwrap_or(0);
                let mut outputs = vec![Vec::with_capacity(len); f.sig.outputs()];
                for i in 0..len {
                    let mut sub = Machine::new(self.asm);
                    sub.stack = args.iter().map(|arg| row(arg, i)).collect();
                    sub.run(&f.node)?;
                    for (out, val) in outputs.iter_mut().zip(sub.stack) {
                        out.push(val);
                    }
                }
                self.stack.extend(outputs.into_iter().map(Value::from_iter));
            }
            Reduce | Scan => {
                let f = &ops[0];
                let xs = list(self.pop()?)?;
                let mut iter = xs.into_iter();
                let mut acc = iter.next().ok_or("cannot reduce an empty list")?;
                let mut scanned = vec![acc.clone()];
                for x in iter {
                    acc = self.call_with(f, vec![acc, x])?;
                    scanned.push(acc.clone());
                }
                if prim == Scan {
                    self.push(Value::from_iter(scanned));
                } else {
                    self.push(acc);
                }
            }
            Repeat => {
                let n = nat(&self.pop()?)?;
                for _ in 0..n {
                    self.run(&ops[0].node)?;
                }
            }
            prim => return Err(format!("{prim} is not a modifier")),
        }
        Ok(())
    }
    fn monadic(&mut self, f: fn(f64) -> f64) -> RunResult {
        let a = self.pop()?;
        self.push(pervade1(&a, f));
        Ok(())
    }
    fn dyadic(&mut self, f: fn(f64, f64) -> f64) -> RunResult {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(pervade2(&a, &b, f)?);
        Ok(())
    }
}

trait SignumOrZero {
    fn signum_or_zero(self) -> Self;
}

impl SignumOrZero for f64 {
    fn signum_or_zero(self) -> Self {
        if self == 0.0 {
            0.0
        } else {
            self.signum()
        }
    }
}

fn pervade1(a: &Value, f: fn(f64) -> f64) -> Value {
    match a {
        Value::Num(n) => Value::Num(f(*n)),
        Value::List(items) => items.iter().map(|item| pervade1(item, f)).collect(),
    }
}

fn pervade2(a: &Value, b: &Value, f: fn(f64, f64) -> f64) -> RunResult<Value> {
    Ok(match (a, b) {
        (Value::Num(a), Value::Num(b)) => Value::Num(f(*a, *b)),
        (Value::Num(_), Value::List(bs)) => bs
            .iter()
            .map(|b| pervade2(a, b, f))
            .collect::<RunResult<_>>()?,
        (Value::List(as_), Value::Num(_)) => as_
            .iter()
            .map(|a| pervade2(a, b, f))
            .collect::<RunResult<_>>()?,
        (Value::List(as_), Value::List(bs)) => {
            if as_.len() != bs.len() {
                return Err(format!("lengths {} and {} do not match", as_.len(), bs.len()));
            }
            as_.iter()
                .zip(bs)
                .map(|(a, b)| pervade2(a, b, f))
                .collect::<RunResult<_>>()?
        }
    })
}

fn num(val: &Value) -> RunResult<f64> {
    val.as_num().ok_or_else(|| format!("expected a number, found {val}"))
}

fn nat(val: &Value) -> RunResult<usize> {
    val.as_nat().ok_or_else(|| format!("expected a natural number, found {val}"))
}

fn list(val: Value) -> RunResult<Vec<Value>> {
    match val {
        Value::List(items) => Ok(items.into_iter().collect()),
        val => Err(format!("expected a list, found {val}")),
    }
}

fn rows(val: Value) -> Vec<Value> {
    match val {
        Value::List(items) => items.into_iter().collect(),
        val => vec![val],
    }
}

fn row(val: &Value, i: usize) -> Value {
    match val {
        Value::List(items) => items.get(i).cloned().unwrap_or_default(),
        val => val.clone(),
    }
}
